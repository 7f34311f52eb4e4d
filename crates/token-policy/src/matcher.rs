/// A single piece of a parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that must appear verbatim in the concrete path.
    Literal(String),
    /// A `{name}` placeholder matching one or more non-slash characters.
    Param(String),
}

/// A path template such as `/posts/{post_id}/comments/{id}`, parsed once into
/// literal and parameter segments.
///
/// Everything outside a placeholder is matched literally, including
/// characters that would carry meaning in a regular expression (`+`, `.`,
/// `?`, ...). The whole concrete path must be consumed for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Tokenize `pattern` into segments.
    ///
    /// A brace pair only forms a placeholder when it encloses a non-empty name
    /// without `/` or `{`. Anything else (an unclosed `{`, `{}`, `{a/b}`) is
    /// kept as literal text, so parsing never fails.
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_param_name(&after[..close]) => {
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(after[..close].to_string()));
                    rest = &after[close + 1..];
                }
                _ => {
                    literal.push_str(&rest[..=open]);
                    rest = after;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// The parsed segments in pattern order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Test whether `path` matches this pattern in full.
    pub fn matches(&self, path: &str) -> bool {
        match_segments(&self.segments, path)
    }
}

/// Check whether `concrete_path` matches the path template `pattern`.
pub fn matches(concrete_path: &str, pattern: &str) -> bool {
    PathPattern::parse(pattern).matches(concrete_path)
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '{'])
}

/// Anchored match of `input` against `segments`.
///
/// A parameter can be followed by a literal that also occurs inside the
/// parameter's run (e.g. `{name}.json` against `a.b.json`), so parameter
/// lengths are tried longest first with backtracking.
fn match_segments(segments: &[Segment], input: &str) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return input.is_empty();
    };

    match first {
        Segment::Literal(text) => input
            .strip_prefix(text.as_str())
            .is_some_and(|tail| match_segments(rest, tail)),
        Segment::Param(_) => {
            let run = input.find('/').unwrap_or(input.len());
            (1..=run)
                .rev()
                .filter(|&end| input.is_char_boundary(end))
                .any(|end| match_segments(rest, &input[end..]))
        }
    }
}
