use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::fmt;

/// One track extracted from a cue sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CueTrack {
    pub number: u32,
    pub title: String,
    pub performer: String,
    /// Start offset within the album image, in seconds (INDEX 01 at 75 frames/s).
    pub start_secs: f64,
}

/// A parsed cue sheet: album-level fields plus the ordered track list.
#[derive(Debug, Clone, PartialEq)]
pub struct CueSheet {
    pub album_title: String,
    pub album_performer: String,
    /// The audio file the sheet references via FILE "...".
    pub audio_file: String,
    pub tracks: Vec<CueTrack>,
}

#[derive(Debug)]
pub enum ParseError {
    NoTracksFound,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoTracksFound => write!(f, "no tracks found in cue sheet"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Decode raw cue-sheet bytes into UTF-8 text.
///
/// Cue sheets in the wild carry inconsistent encodings (GBK, Shift-JIS,
/// Windows-1252, ...), so the bytes go through BOM detection first and a
/// chardetng guess second. If the guessed encoding still reports decode
/// errors the bytes are re-read as UTF-8 with replacement characters.
pub fn decode_cue_bytes(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(bytes);
        tracing::debug!(encoding = encoding.name(), "decoded cue sheet via BOM");
        return text.into_owned();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(
            encoding = used.name(),
            "detected cue encoding produced errors, falling back to UTF-8"
        );
        let (fallback, _, _) = UTF_8.decode(bytes);
        return fallback.into_owned();
    }
    tracing::debug!(encoding = used.name(), "decoded cue sheet");
    text.into_owned()
}

/// Parse cue-sheet text into album fields and an ordered track list.
///
/// Album-level TITLE / PERFORMER / FILE come from the first quoted value in
/// the whole sheet; the body is then split into per-track blocks at each
/// `TRACK <n> AUDIO` marker, and each block is scanned independently for
/// TITLE, PERFORMER and the first `INDEX 01 mm:ss:ff`. Unrecognized fields
/// (REM, FLAGS, ...) are ignored.
pub fn parse_cue_sheet(text: &str) -> Result<CueSheet, ParseError> {
    let title_re = Regex::new(r#"TITLE\s+"([^"]+)""#).unwrap();
    let performer_re = Regex::new(r#"PERFORMER\s+"([^"]+)""#).unwrap();
    let file_re = Regex::new(r#"FILE\s+"([^"]+)""#).unwrap();
    let track_re = Regex::new(r"TRACK\s+(\d+)\s+AUDIO").unwrap();
    let index_re = Regex::new(r"INDEX\s+01\s+(\d+):(\d+):(\d+)").unwrap();

    let album_title = first_capture(&title_re, text).unwrap_or_default();
    let album_performer = first_capture(&performer_re, text).unwrap_or_default();
    let audio_file = first_capture(&file_re, text).unwrap_or_default();

    // Block boundaries: each TRACK marker runs to the next marker or end of text.
    let mut markers = Vec::new();
    for caps in track_re.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let number: u32 = caps[1].parse().unwrap_or(0);
        markers.push((whole.start(), whole.end(), number));
    }

    let mut tracks = Vec::with_capacity(markers.len());
    for (i, &(_, body_start, number)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |m| m.0);
        let block = &text[body_start..body_end];

        let title =
            first_capture(&title_re, block).unwrap_or_else(|| format!("Track_{:02}", number));
        let performer =
            first_capture(&performer_re, block).unwrap_or_else(|| album_performer.clone());
        let start_secs = match index_re.captures(block) {
            Some(caps) => {
                let minutes: f64 = caps[1].parse().unwrap_or(0.0);
                let seconds: f64 = caps[2].parse().unwrap_or(0.0);
                let frames: f64 = caps[3].parse().unwrap_or(0.0);
                minutes * 60.0 + seconds + frames / 75.0
            }
            None => {
                tracing::warn!(track = number, "track has no INDEX 01, defaulting start to 0");
                0.0
            }
        };

        tracks.push(CueTrack {
            number,
            title,
            performer,
            start_secs,
        });
    }

    if tracks.is_empty() {
        return Err(ParseError::NoTracksFound);
    }

    Ok(CueSheet {
        album_title,
        album_performer,
        audio_file,
        tracks,
    })
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].to_string())
}
