use std::collections::BTreeMap;

use starlark_wire::{proto::breakpoint, Breakpoint, Location};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBreakpoint {
    pub line: i32,
    pub condition: Option<String>,
}

impl SourceBreakpoint {
    pub fn new(line: i32, condition: Option<String>) -> Self {
        let condition = condition
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Self { line, condition }
    }
}

/// Breakpoints requested by the client, per source path.
///
/// The debug server only accepts the complete set, so every update is
/// flattened and re-sent in full.
#[derive(Debug, Default)]
pub struct SourceBreakpoints {
    by_path: BTreeMap<String, Vec<SourceBreakpoint>>,
}

impl SourceBreakpoints {
    /// Replace the breakpoints of `path`. An empty list removes the source.
    pub fn set(&mut self, path: impl Into<String>, breakpoints: Vec<SourceBreakpoint>) {
        let path = path.into();
        if breakpoints.is_empty() {
            self.by_path.remove(&path);
        } else {
            self.by_path.insert(path, breakpoints);
        }
    }

    pub fn get(&self, path: &str) -> &[SourceBreakpoint] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_path.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Every breakpoint across all sources, keyed by the path exactly as the
    /// client supplied it.
    pub fn to_wire(&self) -> Vec<Breakpoint> {
        self.by_path
            .iter()
            .flat_map(|(path, bps)| {
                bps.iter().map(move |bp| Breakpoint {
                    expression: bp.condition.clone().unwrap_or_default(),
                    kind: Some(breakpoint::Kind::Location(Location {
                        line_number: bp.line,
                        path: path.clone(),
                        column_number: 0,
                    })),
                })
            })
            .collect()
    }
}
