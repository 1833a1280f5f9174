//! `<token>` expansion for file paths and string parameters.
//!
//! Texture paths, volume files, archive paths and display paths may carry
//! tokens such as `<scene>`, `<layer>`, `<f4>` or `<F4>`. Unknown tokens are
//! kept verbatim, `$NAME` expands from the environment when set.

use std::collections::BTreeMap;

/// Token table for one session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringExpr {
    tokens: BTreeMap<String, String>,
}

impl StringExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(name.into(), value.into());
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    /// Set every frame token (`frame`, `f`, `f2`..`f5`, `F`, `F2`..`F5`).
    pub fn set_frame_context(&mut self, frame: i32) {
        self.set_var("frame", frame.to_string());
        self.set_var("f", frame.to_string());
        self.set_var("F", frame.to_string());
        for width in 2..=5 {
            let padded = format!("{:0>width$}", frame, width = width);
            self.set_var(format!("f{}", width), padded.clone());
            self.set_var(format!("F{}", width), padded);
        }
    }

    /// Expand every token in `expr`.
    pub fn expand(&self, expr: &str) -> String {
        if !expr.contains('<') && !expr.contains('$') {
            return expr.to_string();
        }

        let mut out = String::with_capacity(expr.len());
        let mut rest = expr;
        while let Some(pos) = rest.find(['<', '$']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with('<') {
                match tail.find('>') {
                    Some(end) => {
                        let token = &tail[1..end];
                        match self.lookup(token) {
                            Some(value) => out.push_str(value),
                            None => out.push_str(&tail[..=end]),
                        }
                        rest = &tail[end + 1..];
                    }
                    None => {
                        out.push_str(tail);
                        rest = "";
                    }
                }
            } else {
                let (name, consumed) = env_name(&tail[1..]);
                match std::env::var(name) {
                    Ok(value) if !name.is_empty() => out.push_str(&value),
                    _ => out.push_str(&tail[..1 + consumed]),
                }
                rest = &tail[1 + consumed..];
            }
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, token: &str) -> Option<&str> {
        self.get_var(token)
            .or_else(|| self.get_var(&token.to_lowercase()))
    }
}

/// Parse `NAME` or `{NAME}` after a `$`. Returns the name and how many
/// bytes it spans.
fn env_name(s: &str) -> (&str, usize) {
    if let Some(inner) = s.strip_prefix('{') {
        if let Some(end) = inner.find('}') {
            return (&inner[..end], end + 2);
        }
        return ("", 0);
    }
    let len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    (&s[..len], len)
}

/// Does the string reference the current frame (`<f>`, `<f4>`, `<F4>`...)?
pub fn is_frame_sensitive(s: &str) -> bool {
    s.match_indices('<').any(|(pos, _)| {
        let Some(body) = s[pos + 1..].strip_prefix(['f', 'F']) else {
            return false;
        };
        body.trim_start_matches(|c: char| c.is_ascii_digit())
            .starts_with('>')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_tokens() {
        let mut expr = StringExpr::new();
        expr.set_frame_context(7);
        assert_eq!(expr.expand("tex.<f4>.exr"), "tex.0007.exr");
        assert_eq!(expr.expand("tex.<F2>.<f>.exr"), "tex.07.7.exr");
        assert_eq!(expr.expand("<frame>"), "7");
    }

    #[test]
    fn test_unknown_token_kept() {
        let mut expr = StringExpr::new();
        expr.set_var("scene", "shot010");
        assert_eq!(expr.expand("<scene>/<udim>.tex"), "shot010/<udim>.tex");
        assert_eq!(expr.expand("no tokens"), "no tokens");
        assert_eq!(expr.expand("dangling <scene"), "dangling <scene");
    }

    #[test]
    fn test_lowercase_fallback() {
        let mut expr = StringExpr::new();
        expr.set_var("layer", "beauty");
        assert_eq!(expr.expand("<LAYER>"), "beauty");
    }

    #[test]
    fn test_env_vars() {
        std::env::set_var("TETHER_TEST_ROOT", "/show");
        let expr = StringExpr::new();
        assert_eq!(expr.expand("$TETHER_TEST_ROOT/tex"), "/show/tex");
        assert_eq!(expr.expand("${TETHER_TEST_ROOT}/tex"), "/show/tex");
        assert_eq!(expr.expand("$TETHER_NOT_SET_ANYWHERE/x"), "$TETHER_NOT_SET_ANYWHERE/x");
    }

    #[test]
    fn test_frame_sensitivity() {
        assert!(is_frame_sensitive("tex.<f4>.exr"));
        assert!(is_frame_sensitive("<F>"));
        assert!(is_frame_sensitive("a<F12>b"));
        assert!(!is_frame_sensitive("tex.<scene>.exr"));
        assert!(!is_frame_sensitive("<frame>"));
        assert!(!is_frame_sensitive("plain.tex"));
        assert!(!is_frame_sensitive("<f4"));
    }
}
