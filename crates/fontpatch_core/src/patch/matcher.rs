use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::archive::Archive;

/// Font object names replaced by the shipped configuration.
pub const TARGET_FONT_NAMES: [&str; 13] = [
    "LiberationSans",
    "OpenSans-Bold",
    "OpenSans-BoldItalic",
    "OpenSans-ExtraBold",
    "OpenSans-ExtraBoldItalic",
    "OpenSans-Italic",
    "OpenSans-Light",
    "OpenSans-LightItalic",
    "OpenSans-Medium",
    "OpenSans-MediumItalic",
    "OpenSans-Regular",
    "OpenSans-SemiBold",
    "OpenSans-SemiBoldItalic",
];

/// Decides which font objects to replace and performs the substitution.
///
/// Matching is exact string equality against the target set; the matcher
/// holds its configuration by value and touches no global state.
#[derive(Debug, Clone)]
pub struct FontMatcher {
    targets: BTreeSet<String>,
    replacement: Vec<u8>,
}

impl FontMatcher {
    pub fn new<I, S>(targets: I, replacement: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            replacement,
        }
    }

    pub fn is_target(&self, name: &str) -> bool {
        self.targets.contains(name)
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Scan every object in the archive and install the replacement bytes
    /// into each font whose name is in the target set.
    ///
    /// A failure to materialize or commit one candidate is recorded and the
    /// scan moves on; a single malformed object never aborts the pass.
    pub fn apply(&self, archive: &mut Archive) -> MatchReport {
        let mut report = MatchReport::default();

        for handle in archive.objects() {
            if !handle.is_font() {
                continue;
            }
            report.candidates_seen += 1;

            let mut asset = match archive.read_font(&handle) {
                Ok(asset) => asset,
                Err(e) => {
                    report.failures.push(ObjectFailure {
                        path_id: handle.path_id,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !self.targets.contains(&asset.name) {
                continue;
            }

            asset.font_data = self.replacement.clone();
            match archive.write_font(&handle, &asset) {
                Ok(()) => {
                    report.matches_replaced += 1;
                    report.replaced.push(ReplacedFont {
                        path_id: handle.path_id,
                        name: asset.name,
                    });
                }
                Err(e) => {
                    report.failures.push(ObjectFailure {
                        path_id: handle.path_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub candidates_seen: usize,
    pub matches_replaced: usize,
    pub replaced: Vec<ReplacedFont>,
    pub failures: Vec<ObjectFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacedFont {
    pub path_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub path_id: i64,
    pub message: String,
}
