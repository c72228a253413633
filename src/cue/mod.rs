pub mod parser;
pub mod planner;

pub use parser::{decode_cue_bytes, parse_cue_sheet, CueSheet, CueTrack, ParseError};
pub use planner::{codec_for_source, plan_segments, sanitize_name, PlanError, SegmentPlan};
