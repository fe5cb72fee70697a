// Translation bridge
//
// The external engine is a black box behind the TranslationEngine trait:
// prompt in, tagged text out. The CLI implementation shells out to the
// configured binary; tests substitute a scripted fake.

pub mod engine;
pub mod prompt;

use async_trait::async_trait;
use std::path::Path;

pub use prompt::{build_prompt, parse_response};

use crate::config::TranslateConfig;
use crate::error::Result;
use crate::merge::MergedBlock;
use crate::subtitle::TranslationMap;

/// Main trait for translation operations
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Submit a prompt and return the engine's raw output. The context
    /// directory holds prior translations used as terminology grounding.
    async fn translate(&self, prompt: &str, context_dir: &Path) -> Result<String>;
}

/// Factory for creating engine instances
pub struct EngineFactory;

impl EngineFactory {
    pub fn create_engine(config: TranslateConfig) -> Box<dyn TranslationEngine> {
        Box::new(engine::CliEngine::new(config))
    }
}

/// Full round trip: serialize blocks to a prompt, invoke the engine, and
/// parse the tagged response. Indices the engine did not answer for are
/// simply absent from the returned map.
pub async fn translate_blocks(
    engine: &dyn TranslationEngine,
    blocks: &[MergedBlock],
    target_language: &str,
    context_dir: &Path,
) -> Result<TranslationMap> {
    if blocks.is_empty() {
        return Ok(TranslationMap::new());
    }

    let prompt = build_prompt(blocks, target_language);
    let raw = engine.translate(&prompt, context_dir).await?;
    Ok(parse_response(&raw))
}
