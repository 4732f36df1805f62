//! SRT to WebVTT conversion

/// Converts SRT subtitles to WebVTT.
///
/// Each cue keeps its timestamp line (commas turned into periods) and its
/// text lines; cue numbers and blocks without a `-->` line are dropped.
///
/// # Examples
/// ```
/// use undertow_core::subtitles::convert::srt_to_vtt;
/// let vtt = srt_to_vtt("1\n00:00:01,000 --> 00:00:02,000\nHello\n\n");
/// assert_eq!(vtt, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n\n");
/// ```
pub fn srt_to_vtt(srt: &str) -> String {
    let normalized = srt.replace("\r\n", "\n");
    let mut vtt = String::with_capacity(normalized.len() + 8);
    vtt.push_str("WEBVTT\n\n");

    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let lines: Vec<&str> = block.split('\n').collect();
        let Some(timestamp_index) = lines.iter().position(|line| line.contains("-->")) else {
            continue;
        };

        vtt.push_str(&lines[timestamp_index].replace(',', "."));
        vtt.push('\n');
        for line in &lines[timestamp_index + 1..] {
            vtt.push_str(line);
            vtt.push('\n');
        }
        vtt.push('\n');
    }

    vtt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cue() {
        let vtt = srt_to_vtt("1\n00:00:01,000 --> 00:00:02,000\nHello\n\n");
        assert_eq!(vtt, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n\n");
    }

    #[test]
    fn test_crlf_and_multiline_cues() {
        let srt = "1\r\n00:00:01,000 --> 00:00:02,500\r\nLine one\r\nLine two\r\n\r\n\
                   2\r\n00:01:00,000 --> 00:01:02,000\r\nSecond\r\n";
        let vtt = srt_to_vtt(srt);
        assert_eq!(
            vtt,
            "WEBVTT\n\n\
             00:00:01.000 --> 00:00:02.500\nLine one\nLine two\n\n\
             00:01:00.000 --> 00:01:02.000\nSecond\n\n"
        );
    }

    #[test]
    fn test_blocks_without_timestamp_are_dropped() {
        let srt = "garbage header\n\n1\n00:00:01,000 --> 00:00:02,000\nKept\n\n\n\nno timing here\n";
        assert_eq!(
            srt_to_vtt(srt),
            "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nKept\n\n"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(srt_to_vtt(""), "WEBVTT\n\n");
    }
}
