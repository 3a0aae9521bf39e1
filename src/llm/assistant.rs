// src/llm/assistant.rs
//
// Capability interfaces the fuzzing loop depends on, and the LLM-backed
// implementation of all three. The loop never sees prompts or providers.

use tracing::debug;

use crate::catalog::{FunctionSignature, Language};
use crate::llm::prompt::{
    build_generation_prompt, build_repair_prompt, build_suggestion_prompt, SuggestionContext,
};
use crate::llm::response::extract_code;
use crate::llm::{ServiceError, TextService};

/// Everything the generation service sees for one combination.
pub struct GenerationRequest<'a> {
    pub language: Language,
    pub includes: &'a [String],
    pub targets: Vec<&'a FunctionSignature>,
}

pub trait HarnessGenerator {
    /// Returns harness source; an empty string means nothing usable came back.
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError>;
}

pub trait HarnessRepairer {
    fn repair(
        &self,
        code: &str,
        diagnostic: &str,
        language: Language,
    ) -> Result<String, ServiceError>;
}

pub trait CombinationSuggester {
    /// Returns the raw suggestion text; parsing is the planner's job.
    fn suggest(&self, context: &SuggestionContext<'_>) -> Result<String, ServiceError>;
}

pub struct Assistant<T> {
    service: T,
}

impl<T: TextService> Assistant<T> {
    pub fn new(service: T) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &T {
        &self.service
    }
}

impl<T: TextService> HarnessGenerator for Assistant<T> {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        let prompt = build_generation_prompt(request.language, request.includes, &request.targets);
        let result = self.service.complete(&prompt)?;
        debug!(prompt_hash = %result.prompt_hash, "generation response received");
        Ok(extract_code(&result.text, request.language))
    }
}

impl<T: TextService> HarnessRepairer for Assistant<T> {
    fn repair(
        &self,
        code: &str,
        diagnostic: &str,
        language: Language,
    ) -> Result<String, ServiceError> {
        let prompt = build_repair_prompt(code, diagnostic, language);
        let result = self.service.complete(&prompt)?;
        debug!(prompt_hash = %result.prompt_hash, "repair response received");
        Ok(extract_code(&result.text, language))
    }
}

impl<T: TextService> CombinationSuggester for Assistant<T> {
    fn suggest(&self, context: &SuggestionContext<'_>) -> Result<String, ServiceError> {
        let prompt = build_suggestion_prompt(context);
        let result = self.service.complete(&prompt)?;
        debug!(prompt_hash = %result.prompt_hash, "suggestion response received");
        Ok(result.text)
    }
}
