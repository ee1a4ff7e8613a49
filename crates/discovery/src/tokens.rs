// SPDX-License-Identifier: MIT

//! Project-name token generation, per spec §4.4's "Project matching rule".
//!
//! A pure function of `project_name`, tested independently per spec §9's
//! design note. Lives here (not in `fleet-registry`) because it is
//! logically a discovery-domain concern — it decides whether a *response
//! body* plausibly belongs to a project — and both `fleet-discovery`'s
//! `find_best` and `fleet-registry`'s reuse logic need it.

/// Generates the candidate match tokens for `project_name`: exact
/// lower-case, separators removed, separators-as-spaces, quoted forms,
/// individual words, and reversed word order.
pub fn project_tokens(project_name: &str) -> Vec<String> {
    let lower = project_name.to_lowercase();
    let trimmed = lower.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut push = |s: String| {
        if !s.is_empty() && !tokens.contains(&s) {
            tokens.push(s);
        }
    };

    push(trimmed.to_string());

    let no_separators: String = trimmed.chars().filter(|c| !is_separator(*c)).collect();
    push(no_separators);

    let spaced: String =
        trimmed.chars().map(|c| if is_separator(c) { ' ' } else { c }).collect::<String>();
    let spaced = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    push(spaced.clone());

    push(format!("\"{trimmed}\""));
    push(format!("'{trimmed}'"));

    let words: Vec<&str> = spaced.split_whitespace().collect();
    for word in &words {
        push(word.to_string());
    }

    if words.len() > 1 {
        let reversed = words.iter().rev().cloned().collect::<Vec<_>>().join(" ");
        push(reversed);
    }

    tokens
}

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.' | ' ')
}

/// Whether `body` contains any candidate token of `project_name`.
/// Case-insensitive: `body` is expected to already be lower-cased by the
/// caller for efficiency when matching against many tokens, but this
/// lower-cases defensively.
pub fn body_matches_project(body: &str, project_name: &str) -> bool {
    let body_lower = body.to_lowercase();
    project_tokens(project_name).iter().any(|t| body_lower.contains(t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_exact_lowercase_form() {
        let tokens = project_tokens("My Remotion App");
        assert!(tokens.contains(&"my remotion app".to_string()));
    }

    #[test]
    fn generates_separator_removed_form() {
        let tokens = project_tokens("my-remotion_app");
        assert!(tokens.contains(&"myremotionapp".to_string()));
    }

    #[test]
    fn generates_individual_words() {
        let tokens = project_tokens("my remotion app");
        assert!(tokens.contains(&"remotion".to_string()));
        assert!(tokens.contains(&"app".to_string()));
    }

    #[test]
    fn generates_reversed_word_order() {
        let tokens = project_tokens("remotion app");
        assert!(tokens.contains(&"app remotion".to_string()));
    }

    #[test]
    fn empty_name_yields_no_tokens() {
        assert!(project_tokens("").is_empty());
        assert!(project_tokens("   ").is_empty());
    }

    #[test]
    fn body_matches_project_is_case_insensitive() {
        assert!(body_matches_project("<title>My Remotion App</title>", "my-remotion-app"));
        assert!(!body_matches_project("<title>Unrelated</title>", "my-remotion-app"));
    }
}
