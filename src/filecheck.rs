//! FileCheck-style validation of generated assembly.
//!
//! This module parses CHECK directives and validates output against them, similar to
//! LLVM's FileCheck tool but implemented in a Rust-native way. Horizontal whitespace is
//! canonicalized on both sides, so `CHECK: movq %rax, %rdi` matches the column-aligned
//! listing the emitter produces.

use std::collections::VecDeque;

/// A CHECK directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match pattern on some later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next positive match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// Directives extracted from a check file or string.
#[derive(Debug, Default)]
pub struct CheckSpec {
    pub directives: Vec<CheckDirective>,
}

impl CheckSpec {
    /// Parse directives, one per line. Leading comment markers (`;`, `#`, `//`) are
    /// skipped; lines without a directive are ignored.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut directives = Vec::new();

        for (number, line) in content.lines().enumerate() {
            let mut trimmed = line.trim();
            for marker in [";", "#", "//"] {
                if let Some(rest) = trimmed.strip_prefix(marker) {
                    trimmed = rest.trim_start();
                    break;
                }
            }

            let directive = if let Some(p) = trimmed.strip_prefix("CHECK-LABEL:") {
                CheckDirective::CheckLabel(p.trim().to_string())
            } else if let Some(p) = trimmed.strip_prefix("CHECK-NEXT:") {
                CheckDirective::CheckNext(p.trim().to_string())
            } else if let Some(p) = trimmed.strip_prefix("CHECK-NOT:") {
                CheckDirective::CheckNot(p.trim().to_string())
            } else if trimmed.starts_with("CHECK-EMPTY") {
                CheckDirective::CheckEmpty
            } else if let Some(p) = trimmed.strip_prefix("CHECK:") {
                CheckDirective::Check(p.trim().to_string())
            } else if let Some(p) = trimmed.strip_prefix("COM:") {
                CheckDirective::Comment(p.trim().to_string())
            } else if trimmed.starts_with("CHECK") {
                return Err(format!(
                    "line {}: unknown directive `{}`",
                    number + 1,
                    trimmed
                ));
            } else {
                continue;
            };

            match &directive {
                CheckDirective::Check(p)
                | CheckDirective::CheckLabel(p)
                | CheckDirective::CheckNext(p)
                | CheckDirective::CheckNot(p)
                    if p.is_empty() =>
                {
                    return Err(format!("line {}: empty pattern", number + 1));
                }
                _ => {}
            }
            directives.push(directive);
        }

        Ok(CheckSpec { directives })
    }
}

fn canonical(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validates output against CHECK directives.
pub struct FileChecker {
    verbose: bool,
}

impl FileChecker {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Parse `spec` and validate `output` against it.
    pub fn check_str(&self, output: &str, spec: &str) -> Result<(), String> {
        let spec = CheckSpec::parse(spec)?;
        self.validate_output(output, &spec.directives)
    }

    /// Validate output against CHECK directives
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: VecDeque<String> = output.lines().map(canonical).collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<String> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(canonical(pattern)),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let wanted = canonical(pattern);
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(&wanted));

                    match found {
                        Some(idx) => {
                            let matched = line_idx + idx;
                            Self::check_absent(&output_lines, line_idx, matched, &pending_not)?;
                            pending_not.clear();
                            line_idx = matched + 1;
                            if self.verbose {
                                log::debug!("`{pattern}` matched line {matched}");
                            }
                        }
                        None => {
                            let kind = match directive {
                                CheckDirective::CheckLabel(_) => "CHECK-LABEL",
                                _ => "CHECK",
                            };
                            return Err(format!(
                                "{}: pattern '{}' not found in output",
                                kind, pattern
                            ));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = &output_lines[line_idx];
                    if !line.contains(&canonical(pattern)) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }

                    if self.verbose {
                        log::debug!("`{pattern}` matched next line {line_idx}");
                    }
                    pending_not.clear();
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = &output_lines[line_idx];
                    if !line.is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        Self::check_absent(&output_lines, line_idx, output_lines.len(), &pending_not)
    }

    fn check_absent(
        lines: &VecDeque<String>,
        from: usize,
        to: usize,
        patterns: &[String],
    ) -> Result<(), String> {
        for (offset, line) in lines.iter().skip(from).take(to.saturating_sub(from)).enumerate() {
            if let Some(p) = patterns.iter().find(|p| line.contains(p.as_str())) {
                return Err(format!(
                    "CHECK-NOT: pattern '{}' found at line {}: '{}'",
                    p,
                    from + offset,
                    line
                ));
            }
        }
        Ok(())
    }
}
