// Pulls harness source out of free-form model output.

use crate::catalog::Language;

const KNOWN_TAGS: &[&str] = &["c", "h", "cpp", "c++", "cxx", "cc", "hpp"];

struct Fence<'a> {
    tag: String,
    body: &'a str,
}

fn fences(text: &str) -> Vec<Fence<'_>> {
    let mut out = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let (info, body_start) = match after.find('\n') {
            Some(nl) => (&after[..nl], nl + 1),
            None => (after, after.len()),
        };
        let body_all = &after[body_start..];

        let (body, next) = match body_all.find("```") {
            Some(close) => (&body_all[..close], &body_all[close + 3..]),
            None => (body_all, ""),
        };

        out.push(Fence {
            tag: info.trim().to_ascii_lowercase(),
            body,
        });
        rest = next;
    }

    out
}

/// Extracts the harness source from a model response.
///
/// Preference order:
/// 1. first fence tagged with the target language
/// 2. first fence tagged with any C-family language
/// 3. first unlabeled fence
/// 4. the whole response, trimmed
///
/// A bare language tag on the first line inside the fence is dropped.
pub fn extract_code(response: &str, language: Language) -> String {
    let blocks = fences(response);

    let chosen = blocks
        .iter()
        .find(|f| language.fence_tags().contains(&f.tag.as_str()))
        .or_else(|| blocks.iter().find(|f| KNOWN_TAGS.contains(&f.tag.as_str())))
        .or_else(|| blocks.iter().find(|f| f.tag.is_empty()));

    match chosen {
        Some(f) => strip_tag_line(f.body).trim().to_string(),
        None => response.trim().to_string(),
    }
}

fn strip_tag_line(body: &str) -> &str {
    let body = body.trim_start_matches(['\r', '\n']);
    let (first, rest) = match body.find('\n') {
        Some(nl) => (&body[..nl], &body[nl + 1..]),
        None => return body,
    };

    if KNOWN_TAGS.contains(&first.trim().to_ascii_lowercase().as_str()) {
        rest
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_language_tagged_fence() {
        let text = "Here:\n```\nnot this\n```\nand\n```c\nint main(void) { return 0; }\n```\n";
        assert_eq!(extract_code(text, Language::C), "int main(void) { return 0; }");
    }

    #[test]
    fn cpp_tag_is_not_mistaken_for_c() {
        let text = "```cpp\nint f() { return 1; }\n```";
        assert_eq!(extract_code(text, Language::C), "int f() { return 1; }");
        assert_eq!(extract_code(text, Language::Cpp), "int f() { return 1; }");
    }

    #[test]
    fn falls_back_to_unlabeled_fence() {
        let text = "```python\nprint(1)\n```\n```\nint x = 1;\n```";
        assert_eq!(extract_code(text, Language::C), "int x = 1;");
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(extract_code("  int y = 2;  \n", Language::C), "int y = 2;");
    }

    #[test]
    fn strips_leading_tag_line_inside_fence() {
        let text = "```\nc\n#include <stdint.h>\nint z;\n```";
        assert_eq!(extract_code(text, Language::C), "#include <stdint.h>\nint z;");
    }

    #[test]
    fn tolerates_unterminated_fence() {
        let text = "```c\nint w;\n";
        assert_eq!(extract_code(text, Language::C), "int w;");
    }
}
