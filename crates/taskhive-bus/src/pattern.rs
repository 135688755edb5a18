use taskhive_core::{HiveError, HiveResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` — exactly one segment.
    Star,
    /// `#` — the remainder of the topic; only valid as the last segment.
    Hash,
}

/// A dotted topic glob, e.g. `agent.*.result` or `session.debate.#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<Segment>,
    source: String,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> HiveResult<Self> {
        if pattern.is_empty() {
            return Err(HiveError::Validation("empty topic pattern".into()));
        }

        let raw: Vec<&str> = pattern.split('.').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, seg) in raw.iter().enumerate() {
            match *seg {
                "" => {
                    return Err(HiveError::Validation(format!(
                        "empty segment in topic pattern '{pattern}'"
                    )))
                }
                "*" => segments.push(Segment::Star),
                "#" => {
                    if i != raw.len() - 1 {
                        return Err(HiveError::Validation(format!(
                            "'#' must be the last segment in '{pattern}'"
                        )));
                    }
                    segments.push(Segment::Hash);
                }
                lit => segments.push(Segment::Literal(lit.to_string())),
            }
        }

        Ok(Self {
            segments,
            source: pattern.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('.').collect();
        let mut i = 0;
        for segment in &self.segments {
            match segment {
                Segment::Hash => return true,
                Segment::Star => {
                    if i >= parts.len() {
                        return false;
                    }
                    i += 1;
                }
                Segment::Literal(lit) => {
                    if i >= parts.len() || parts[i] != lit {
                        return false;
                    }
                    i += 1;
                }
            }
        }
        i == parts.len()
    }
}

/// Validate a concrete (wildcard-free) topic for publishing.
pub fn validate_topic(topic: &str) -> HiveResult<()> {
    if topic.is_empty() {
        return Err(HiveError::Validation("empty topic".into()));
    }
    for seg in topic.split('.') {
        if seg.is_empty() {
            return Err(HiveError::Validation(format!(
                "empty segment in topic '{topic}'"
            )));
        }
        if seg == "*" || seg == "#" {
            return Err(HiveError::Validation(format!(
                "wildcards are not allowed in a published topic ('{topic}')"
            )));
        }
    }
    Ok(())
}
