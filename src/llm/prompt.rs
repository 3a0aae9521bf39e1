use crate::catalog::{FunctionSignature, Language};
use crate::fuzzer::combination::Combination;
use crate::fuzzer::coverage::CoverageSample;

const MAX_INCLUDES: usize = 10;
const DOCSTRING_EXCERPT: usize = 200;
const MAX_SUGGESTION_NAMES: usize = 30;

#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

/* ============================================================
   Generation
   ============================================================ */

fn generation_system_prompt() -> String {
    r#"
You are an expert in writing libFuzzer harnesses for C and C++ code.

Rules:
- The harness must compile as a standalone translation unit
- Use LLVMFuzzerTestOneInput as the only entry point
- Derive every argument from the fuzz input; never read files or the network
- Initialize pointer arguments to valid memory of the right size
- Check input length before slicing it into fields
- Output only code inside a single fenced block tagged with the language
"#
    .trim()
    .to_string()
}

pub fn build_generation_prompt(
    language: Language,
    includes: &[String],
    targets: &[&FunctionSignature],
) -> LlmPrompt {
    let mut out = String::new();

    out.push_str(&format!(
        "Write a fuzz harness in {} for the functions below.\n\n",
        language.to_string().to_uppercase()
    ));

    if !includes.is_empty() {
        out.push_str("HEADERS\n");
        for inc in includes.iter().take(MAX_INCLUDES) {
            out.push_str(&format!("#include <{}>\n", inc));
        }
        out.push('\n');
    }

    out.push_str("TARGET FUNCTIONS\n");
    for f in targets {
        out.push_str(&format!("{};\n", f.prototype()));

        if let Some(doc) = f.docstring.as_deref().filter(|d| !d.trim().is_empty()) {
            let excerpt: String = doc.chars().take(DOCSTRING_EXCERPT).collect();
            out.push_str(&format!("  // {}\n", excerpt.replace('\n', " ")));
        }

        for p in f.params.iter().filter(|p| p.is_pointer) {
            out.push_str(&format!(
                "  // `{}` is a pointer and must point to initialized memory\n",
                p.name
            ));
        }
    }

    out.push_str(
        "\nREQUIREMENTS\n\
         1. Entry point: int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size)\n\
         2. Extract argument values from the fuzz input\n\
         3. Bounds-check before every read from the input\n\
         4. Release everything the harness allocates\n",
    );

    LlmPrompt {
        system: generation_system_prompt(),
        user: out,
    }
}

/* ============================================================
   Repair
   ============================================================ */

fn repair_system_prompt() -> String {
    r#"
You repair fuzz harnesses that fail to compile or crash.

Rules:
- Keep the original test intent
- Fix only what the diagnostic points at
- Do not restructure working code
- The result must compile as a standalone translation unit
- Output the complete fixed code inside a single fenced block
"#
    .trim()
    .to_string()
}

pub fn build_repair_prompt(code: &str, diagnostic: &str, language: Language) -> LlmPrompt {
    let tag = language.extension();
    let user = format!(
        "Fix the fuzz harness below.\n\n\
         CODE\n```{tag}\n{code}\n```\n\n\
         DIAGNOSTIC\n{diagnostic}\n\n\
         Return the full corrected harness.\n"
    );

    LlmPrompt {
        system: repair_system_prompt(),
        user,
    }
}

/* ============================================================
   Combination suggestions
   ============================================================ */

fn suggestion_system_prompt() -> String {
    r#"
You plan fuzzing campaigns. Given coverage feedback, propose new combinations
of API functions whose joint use is likely to reach unexplored code.

Output format: one combination per line, function names separated by commas.
No numbering, no explanations.
"#
    .trim()
    .to_string()
}

/// Context handed to the suggestion service when heuristic search stalls.
pub struct SuggestionContext<'a> {
    pub coverage: &'a CoverageSample,
    pub recent: &'a [Combination],
    pub available: Vec<&'a str>,
    pub priority: Vec<&'a str>,
}

pub fn build_suggestion_prompt(ctx: &SuggestionContext<'_>) -> LlmPrompt {
    let mut out = String::new();

    out.push_str("FUZZING STATUS\n");
    out.push_str(&format!(
        "- line coverage: {:.1}%\n- branch coverage: {:.1}%\n- new paths: {}\n\n",
        ctx.coverage.line_coverage(),
        ctx.coverage.branch_coverage(),
        ctx.coverage.new_paths
    ));

    out.push_str("RECENTLY TESTED\n");
    if ctx.recent.is_empty() {
        out.push_str("(none)\n");
    }
    for c in ctx.recent {
        out.push_str(&format!("{}\n", c.names().join(", ")));
    }

    out.push_str("\nAVAILABLE FUNCTIONS\n");
    let names: Vec<&str> = ctx
        .available
        .iter()
        .take(MAX_SUGGESTION_NAMES)
        .copied()
        .collect();
    out.push_str(&names.join(", "));
    out.push('\n');

    if !ctx.priority.is_empty() {
        out.push_str("\nHIGH-YIELD FUNCTIONS\n");
        out.push_str(&ctx.priority.join(", "));
        out.push('\n');
    }

    out.push_str(
        "\nPropose 3-5 new combinations, each with 1-3 functions, \
         that differ from the ones already tested.\n",
    );

    LlmPrompt {
        system: suggestion_system_prompt(),
        user: out,
    }
}
