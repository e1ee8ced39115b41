mod error;
mod matcher;
mod replacer;

pub use error::{PatchError, PatchErrorCode};
pub use matcher::{FontMatcher, MatchReport, ObjectFailure, ReplacedFont, TARGET_FONT_NAMES};
pub use replacer::{Replacer, SwapFailure, read_font_bytes};
