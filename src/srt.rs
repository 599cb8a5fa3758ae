//! SubRip (`.srt`) loading.
//!
//! Parses the block grammar
//!
//! ```text
//! index
//! HH:MM:SS,mmm --> HH:MM:SS,mmm
//! text line
//! more text
//! (blank line)
//! ```
//!
//! into [`SubtitleEntry`] values in file order. Multi-line text is joined
//! with spaces. Blocks that do not match the grammar are skipped and logged
//! at debug level; they never fail the load.

use std::fs;
use std::path::Path;

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{digit1, line_ending, space0};
use nom::combinator::{eof, map_res};

use crate::error::SubgridError;
use crate::timeline::SubtitleEntry;

/// Read and parse an SRT file.
///
/// The file is decoded as UTF-8, falling back to Latin-1 when it is not
/// valid UTF-8.
///
/// # Errors
///
/// Returns [`SubgridError::IoError`] if the file cannot be read.
pub fn load_srt<P: AsRef<Path>>(path: P) -> Result<Vec<SubtitleEntry>, SubgridError> {
    let path = path.as_ref();
    log::debug!("Loading subtitles from {}", path.display());

    let bytes = fs::read(path)?;
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(error) => {
            log::warn!(
                "{} is not valid UTF-8, reading it as Latin-1",
                path.display()
            );
            error.into_bytes().into_iter().map(char::from).collect()
        }
    };

    Ok(parse_srt(&content))
}

/// Parse SRT text into entries, skipping malformed blocks.
///
/// A leading byte-order mark and CRLF line endings are accepted. Blocks whose
/// end time precedes their start time, or whose index repeats an earlier
/// block's, are treated as malformed.
pub fn parse_srt(content: &str) -> Vec<SubtitleEntry> {
    let normalized = content
        .strip_prefix('\u{feff}')
        .unwrap_or(content)
        .replace("\r\n", "\n");

    let mut entries: Vec<SubtitleEntry> = Vec::new();
    for (position, raw_block) in normalized.split("\n\n").enumerate() {
        let block = raw_block.trim_start_matches('\n');
        if block.trim().is_empty() {
            continue;
        }

        let entry = match subtitle_block(block) {
            Ok((_, entry)) => entry,
            Err(error) => {
                log::debug!("Skipping malformed subtitle block #{position}: {error}");
                continue;
            }
        };

        if entry.start_ms > entry.end_ms {
            log::debug!(
                "Skipping subtitle {}: ends before it starts ({} > {})",
                entry.index,
                entry.start_ms,
                entry.end_ms
            );
            continue;
        }
        if entries.iter().any(|existing| existing.index == entry.index) {
            log::warn!("Skipping subtitle with duplicate index {}", entry.index);
            continue;
        }

        entries.push(entry);
    }

    log::debug!("Parsed {} subtitle entries", entries.len());
    entries
}

fn subtitle_block(input: &str) -> IResult<&str, SubtitleEntry> {
    let (input, index) = map_res(digit1, str::parse::<u32>)(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = line_ending(input)?;
    let (input, start_ms) = timestamp(input)?;
    let (input, _) = tag(" --> ")(input)?;
    let (input, end_ms) = timestamp(input)?;
    let (input, _) = space0(input)?;
    let (text, _) = alt((line_ending, eof))(input)?;

    Ok((
        "",
        SubtitleEntry {
            index,
            start_ms,
            end_ms,
            text: text.replace('\n', " ").trim().to_string(),
        },
    ))
}

fn timestamp(input: &str) -> IResult<&str, u64> {
    let (input, hours) = digits(2)(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, minutes) = digits(2)(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, seconds) = digits(2)(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, millis) = digits(3)(input)?;
    Ok((input, ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis))
}

fn digits(count: usize) -> impl Fn(&str) -> IResult<&str, u64> {
    move |input| {
        map_res(
            take_while_m_n(count, count, |c: char| c.is_ascii_digit()),
            str::parse::<u64>,
        )(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamps() {
        assert_eq!(timestamp("00:00:02,280"), Ok(("", 2280)));
        assert_eq!(timestamp("01:02:03,004 rest"), Ok((" rest", 3_723_004)));
        assert!(timestamp("0:00:02,280").is_err());
        assert!(timestamp("00:00:02.280").is_err());
    }

    #[test]
    fn joins_multiline_text() {
        let entries = parse_srt("1\n00:00:01,000 --> 00:00:02,000\nHello\nworld\n\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Hello world");
    }

    #[test]
    fn block_without_text_is_empty() {
        let entries = parse_srt("7\n00:00:01,000 --> 00:00:02,000");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 7);
        assert!(entries[0].text.is_empty());
    }
}
