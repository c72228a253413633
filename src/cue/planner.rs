use crate::cue::parser::CueTrack;
use crate::transcode::Codec;
use regex::Regex;
use std::fmt;

/// One planned output file for a split job.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    /// Mirrors the cue track number.
    pub index: u32,
    pub file_name: String,
    pub start_secs: f64,
    /// None for the last segment: cut runs to the end of the source.
    pub duration_secs: Option<f64>,
}

#[derive(Debug)]
pub enum PlanError {
    UnsupportedFormat(String),
    NonMonotonicTracks { track: u32, duration: f64 },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::UnsupportedFormat(ext) => {
                write!(f, "unsupported audio format: {}", ext)
            }
            PlanError::NonMonotonicTracks { track, duration } => write!(
                f,
                "track {} has a negative duration ({:.3}s), cue indices are not monotonic",
                track, duration
            ),
        }
    }
}

impl std::error::Error for PlanError {}

/// Replace filesystem-illegal characters with `_` and trim surrounding whitespace.
pub fn sanitize_name(name: &str) -> String {
    let illegal = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    illegal.replace_all(name, "_").trim().to_string()
}

/// Pick the ffmpeg encoder for a split by source container extension.
///
/// A split only trims, it never changes container format, so anything beyond
/// FLAC and WAV is rejected here.
pub fn codec_for_source(extension: &str) -> Result<Codec, PlanError> {
    match extension.to_ascii_lowercase().as_str() {
        "flac" | ".flac" => Ok(Codec::flac()),
        "wav" | ".wav" => Ok(Codec::pcm_wav()),
        other => Err(PlanError::UnsupportedFormat(other.to_string())),
    }
}

/// Turn an ordered track list into `(start, duration)` plans with sanitized
/// output filenames. Pure transform, performs no I/O.
pub fn plan_segments(tracks: &[CueTrack], out_ext: &str) -> Result<Vec<SegmentPlan>, PlanError> {
    let mut plans = Vec::with_capacity(tracks.len());
    for (i, track) in tracks.iter().enumerate() {
        let duration_secs = match tracks.get(i + 1) {
            Some(next) => {
                let duration = next.start_secs - track.start_secs;
                if duration < 0.0 {
                    return Err(PlanError::NonMonotonicTracks {
                        track: track.number,
                        duration,
                    });
                }
                Some(duration)
            }
            None => None,
        };

        let title = sanitize_name(&track.title);
        let performer = sanitize_name(&track.performer);
        let file_name = if performer.is_empty() {
            format!("{:02}. {}{}", track.number, title, out_ext)
        } else {
            format!("{:02}. {} - {}{}", track.number, performer, title, out_ext)
        };

        plans.push(SegmentPlan {
            index: track.number,
            file_name,
            start_secs: track.start_secs,
            duration_secs,
        });
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(number: u32, title: &str, performer: &str, start_secs: f64) -> CueTrack {
        CueTrack {
            number,
            title: title.to_string(),
            performer: performer.to_string(),
            start_secs,
        }
    }

    #[test]
    fn plans_scenario_with_open_ended_tail() {
        let tracks = vec![
            track(1, "One", "Artist", 0.0),
            track(2, "Two", "Artist", 125.0),
            track(3, "Three", "Artist", 260.4),
        ];
        let plans = plan_segments(&tracks, ".flac").unwrap();
        assert_eq!(plans[0].duration_secs, Some(125.0));
        assert!((plans[1].duration_secs.unwrap() - 135.4).abs() < 1e-9);
        assert_eq!(plans[2].duration_secs, None);
    }

    #[test]
    fn durations_sum_to_span_of_bounded_segments() {
        let tracks = vec![
            track(1, "a", "", 3.2),
            track(2, "b", "", 71.6),
            track(3, "c", "", 154.0),
            track(4, "d", "", 300.25),
        ];
        let plans = plan_segments(&tracks, ".wav").unwrap();
        let sum: f64 = plans
            .iter()
            .filter_map(|p| p.duration_secs)
            .sum();
        let span = plans.last().unwrap().start_secs - plans[0].start_secs;
        assert!((sum - span).abs() < 1e-9);
    }

    #[test]
    fn filename_includes_performer_when_present() {
        let tracks = vec![track(7, "Song", "Band", 0.0)];
        let plans = plan_segments(&tracks, ".flac").unwrap();
        assert_eq!(plans[0].file_name, "07. Band - Song.flac");
    }

    #[test]
    fn filename_omits_empty_performer() {
        let tracks = vec![track(7, "Song", "", 0.0)];
        let plans = plan_segments(&tracks, ".wav").unwrap();
        assert_eq!(plans[0].file_name, "07. Song.wav");
    }

    #[test]
    fn non_monotonic_tracks_are_rejected() {
        let tracks = vec![track(1, "a", "", 100.0), track(2, "b", "", 50.0)];
        let err = plan_segments(&tracks, ".flac").unwrap_err();
        assert!(matches!(err, PlanError::NonMonotonicTracks { track: 1, .. }));
    }

    #[test]
    fn sanitize_strips_illegal_characters() {
        let cleaned = sanitize_name(r#" AC/DC: "Back<>" |in\ Black?* "#);
        for c in ['<', '>', ':', '"', '/', '\\', '|', '?', '*'] {
            assert!(!cleaned.contains(c), "found {:?} in {:?}", c, cleaned);
        }
        assert_eq!(cleaned, cleaned.trim());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_name("a/b:c*d ");
        assert_eq!(sanitize_name(&once), once);
    }

    #[test]
    fn codec_selection_by_extension() {
        assert_eq!(codec_for_source("flac").unwrap().extension, ".flac");
        assert_eq!(codec_for_source("WAV").unwrap().encoder, "pcm_s16le");
        let err = codec_for_source("ape").unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedFormat(ref e) if e == "ape"));
    }
}
