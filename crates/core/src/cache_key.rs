//! Cache key derivation and glob matching for the result cache.

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::generation::GenerationRequest;
use crate::types::DbId;

/// Prefix of every generation result key.
pub const GENERATION_KEY_PREFIX: &str = "gen:";

/// Prefix of every cached owner balance.
pub const BALANCE_KEY_PREFIX: &str = "user_credits:";

/// Deterministic key for a request's output.
///
/// Built from provider, model, effective style, aspect ratio, and the
/// lower-cased trimmed prompt. Every part keeps its position and is length
/// prefixed, with `-` standing in for an absent part, so no two distinct
/// requests share an encoding. The encoding is hashed so keys stay short
/// regardless of prompt length.
pub fn generation_cache_key(request: &GenerationRequest) -> String {
    let prompt = request.prompt.trim().to_lowercase();
    let parts = [
        Some(request.provider.as_str()),
        Some(request.model_id()),
        request.effective_style(),
        request.aspect_ratio.as_deref(),
        Some(prompt.as_str()),
    ];

    let mut hasher = Sha256::new();
    for part in parts {
        match part.filter(|p| !p.is_empty()) {
            Some(value) => hasher.update(format!("{}:{value};", value.len())),
            None => hasher.update(b"-;"),
        }
    }
    format!("{GENERATION_KEY_PREFIX}{:x}", hasher.finalize())
}

/// Key of the short-lived balance read-through entry for one owner.
pub fn balance_cache_key(owner_id: DbId) -> String {
    format!("{BALANCE_KEY_PREFIX}{owner_id}")
}

/// Compile a glob (`*` = any run, `?` = one character) into an anchored
/// regex. Every other character matches literally.
pub fn compile_glob(pattern: &str) -> Result<Regex, CoreError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source)
        .map_err(|e| CoreError::Validation(format!("Invalid cache pattern {pattern:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_prefixed() {
        let req = GenerationRequest::new("flux", "A red fox");
        let a = generation_cache_key(&req);
        let b = generation_cache_key(&req.clone());
        assert_eq!(a, b);
        assert!(a.starts_with(GENERATION_KEY_PREFIX));
        // sha256 hex digest
        assert_eq!(a.len(), GENERATION_KEY_PREFIX.len() + 64);
    }

    #[test]
    fn prompt_case_and_whitespace_normalized() {
        let a = GenerationRequest::new("flux", "A Red Fox");
        let b = GenerationRequest::new("flux", "  a red fox ");
        assert_eq!(generation_cache_key(&a), generation_cache_key(&b));
    }

    #[test]
    fn style_and_aspect_ratio_change_key() {
        let base = GenerationRequest::new("flux", "fox");
        let styled = base.clone().with_style("anime");
        let wide = base.clone().with_aspect_ratio("16:9");
        assert_ne!(generation_cache_key(&base), generation_cache_key(&styled));
        assert_ne!(generation_cache_key(&base), generation_cache_key(&wide));
        assert_ne!(generation_cache_key(&styled), generation_cache_key(&wide));
    }

    #[test]
    fn style_none_matches_no_style() {
        let base = GenerationRequest::new("flux", "fox");
        let none = base.clone().with_style("none");
        assert_eq!(generation_cache_key(&base), generation_cache_key(&none));
    }

    #[test]
    fn provider_and_model_change_key() {
        let a = GenerationRequest::new("flux", "fox");
        let b = GenerationRequest::new("qwen", "fox");
        let c = a.clone().with_model("flux-max");
        assert_ne!(generation_cache_key(&a), generation_cache_key(&b));
        assert_ne!(generation_cache_key(&a), generation_cache_key(&c));
    }

    #[test]
    fn delimiter_in_prompt_does_not_collide_with_style() {
        let styled = GenerationRequest::new("flux", "dog").with_style("cat");
        let plain = GenerationRequest::new("flux", "cat:dog");
        assert_ne!(generation_cache_key(&styled), generation_cache_key(&plain));
    }

    #[test]
    fn absent_part_keeps_its_position() {
        let styled = GenerationRequest::new("flux", "fox").with_style("16:9");
        let wide = GenerationRequest::new("flux", "fox").with_aspect_ratio("16:9");
        assert_ne!(generation_cache_key(&styled), generation_cache_key(&wide));
    }

    #[test]
    fn balance_key_format() {
        assert_eq!(balance_cache_key(42), "user_credits:42");
    }

    #[test]
    fn glob_star_and_question_mark() {
        let re = compile_glob("user_credits:*").unwrap();
        assert!(re.is_match("user_credits:1"));
        assert!(re.is_match("user_credits:"));
        assert!(!re.is_match("gen:abc"));

        let re = compile_glob("job:?").unwrap();
        assert!(re.is_match("job:1"));
        assert!(!re.is_match("job:12"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let re = compile_glob("a.b*").unwrap();
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("axbc"));
    }

    #[test]
    fn glob_matches_every_star() {
        let re = compile_glob("*:*:end").unwrap();
        assert!(re.is_match("a:b:end"));
        assert!(!re.is_match("a:b:other"));
    }
}
