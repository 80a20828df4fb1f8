//! Deployment descriptor inspection: whitespace-insensitive comparison and
//! image tag extraction.

use std::sync::LazyLock;

use regex::Regex;

static IMAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*-?\s*image:\s*["']?([^\s"'#]+)"#).expect("valid image regex")
});

/// Line-level change counts between two descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

fn normalize(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

/// True when the descriptors differ at most in whitespace within lines
pub fn equivalent(current: &str, candidate: &str) -> bool {
    current.lines().map(normalize).eq(candidate.lines().map(normalize))
}

/// Count added and removed lines, ignoring whitespace within lines
pub fn diff_summary(current: &str, candidate: &str) -> DiffSummary {
    let old: Vec<String> = current.lines().map(normalize).collect();
    let new: Vec<String> = candidate.lines().map(normalize).collect();

    // Longest common subsequence, one row at a time
    let mut prev = vec![0usize; new.len() + 1];
    let mut row = vec![0usize; new.len() + 1];
    for a in &old {
        for (j, b) in new.iter().enumerate() {
            row[j + 1] = if a == b {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    let common = prev[new.len()];

    DiffSummary {
        added: new.len() - common,
        removed: old.len() - common,
    }
}

/// Tag of the first tagged `image:` reference, if any.
///
/// Digests are ignored and a registry port is not mistaken for a tag.
pub fn version_token(descriptor: &str) -> Option<String> {
    IMAGE_LINE
        .captures_iter(descriptor)
        .filter_map(|caps| caps.get(1))
        .find_map(|image| image_tag(image.as_str()))
}

fn image_tag(reference: &str) -> Option<String> {
    let name = reference.split('@').next().unwrap_or(reference);
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    let (_, tag) = last_segment.rsplit_once(':')?;
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

/// Commit message recording a descriptor update
pub fn commit_message(descriptor_name: &str, version: Option<&str>, source_url: &str) -> String {
    match version {
        Some(version) => format!(
            "Update {} to {} from {}",
            descriptor_name, version, source_url
        ),
        None => format!("Update {} from {}", descriptor_name, source_url),
    }
}
