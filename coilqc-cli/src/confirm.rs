//! Operator confirmation of segmentation candidates on the terminal

use std::io::{BufRead, Write};
use std::path::PathBuf;

use log::info;

use coilqc::{Confirmer, Decision, MaskPreview, QcError, Result, ThresholdPair};

/// Shows each candidate and asks the operator to accept or retry
///
/// The overlay is written as a PNG into `preview_dir` when one is given, so
/// it can be opened in any image viewer while the prompt waits.
pub struct TerminalConfirmer<R, W> {
    input: R,
    output: W,
    preview_dir: Option<PathBuf>,
    previews: usize,
}

impl<R: BufRead, W: Write> TerminalConfirmer<R, W> {
    pub fn new(input: R, output: W, preview_dir: Option<PathBuf>) -> Self {
        Self {
            input,
            output,
            preview_dir,
            previews: 0,
        }
    }

    fn save_preview(&mut self, preview: &MaskPreview) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.preview_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        self.previews += 1;
        let path = dir.join(format!(
            "preview_{:03}_attempt_{}.png",
            self.previews, preview.attempt
        ));
        preview.overlay.save(&path)?;
        info!("Wrote mask preview to {}", path.display());
        Ok(Some(path))
    }
}

/// Operator's answer to one prompt
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reply {
    Accept,
    Retry(ThresholdPair),
    Quit,
}

fn parse_reply(line: &str) -> Option<Reply> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" | "y" | "yes" | "a" | "accept" => return Some(Reply::Accept),
        "q" | "quit" => return Some(Reply::Quit),
        _ => {}
    }
    let mut fields = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|f| !f.is_empty());
    let lower = fields.next()?.parse().ok()?;
    let upper = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(Reply::Retry(ThresholdPair::new(lower, upper)))
}

impl<R: BufRead, W: Write> Confirmer for TerminalConfirmer<R, W> {
    fn confirm(&mut self, preview: &MaskPreview) -> Result<Decision> {
        let saved = self.save_preview(preview)?;

        writeln!(
            self.output,
            "Attempt {} with {}: {} pixels in candidate mask",
            preview.attempt,
            preview.thresholds,
            preview.foreground_pixels()
        )?;
        if let Some(path) = saved {
            writeln!(self.output, "Preview: {}", path.display())?;
        }

        loop {
            write!(
                self.output,
                "Accept mask? [Y]es / LOWER UPPER to retry / q to quit: "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(QcError::Confirmation(
                    "input closed before the mask was accepted".to_string(),
                ));
            }
            match parse_reply(&line) {
                Some(Reply::Accept) => return Ok(Decision::Accept),
                Some(Reply::Retry(thresholds)) => return Ok(Decision::Retry(thresholds)),
                Some(Reply::Quit) => {
                    return Err(QcError::Confirmation(
                        "segmentation aborted by operator".to_string(),
                    ))
                }
                None => writeln!(self.output, "Could not parse {:?}", line.trim())?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use coilqc::{AnalysisConfig, Image, SegmentationEngine};

    /// 24x24 background with a 12x12 bright square in the middle
    fn phantom() -> Image {
        let samples = (0..24 * 24)
            .map(|i| {
                let (r, c) = (i / 24, i % 24);
                if (6..18).contains(&r) && (6..18).contains(&c) {
                    900.0
                } else {
                    15.0
                }
            })
            .collect();
        Image::from_vec(24, 24, samples).unwrap()
    }

    fn engine() -> SegmentationEngine {
        SegmentationEngine::new(ThresholdPair::new(0.1, 0.3), &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply("\n"), Some(Reply::Accept));
        assert_eq!(parse_reply("Yes"), Some(Reply::Accept));
        assert_eq!(parse_reply("q"), Some(Reply::Quit));
        assert_eq!(
            parse_reply("0.05 0.4"),
            Some(Reply::Retry(ThresholdPair::new(0.05, 0.4)))
        );
        assert_eq!(
            parse_reply("0.05,0.4"),
            Some(Reply::Retry(ThresholdPair::new(0.05, 0.4)))
        );
        assert_eq!(parse_reply("0.05"), None);
        assert_eq!(parse_reply("0.1 0.2 0.3"), None);
        assert_eq!(parse_reply("maybe"), None);
    }

    #[test]
    fn test_retry_then_accept() {
        let dir = tempfile::tempdir().unwrap();
        let input = Cursor::new("nonsense\n0.05 0.5\ny\n");
        let mut output = Vec::new();
        let mut confirmer =
            TerminalConfirmer::new(input, &mut output, Some(dir.path().to_path_buf()));

        let mut engine = engine();
        let masks = engine.segment(&phantom(), &mut confirmer).unwrap();
        assert_eq!(masks.thresholds, ThresholdPair::new(0.05, 0.5));
        assert_eq!(masks.accepted.count(), 144);

        assert!(dir.path().join("preview_001_attempt_1.png").exists());
        assert!(dir.path().join("preview_002_attempt_2.png").exists());
        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("Could not parse"));
    }

    #[test]
    fn test_quit_and_closed_input() {
        let mut output = Vec::new();
        let mut confirmer = TerminalConfirmer::new(Cursor::new("q\n"), &mut output, None);
        let err = engine().segment(&phantom(), &mut confirmer).unwrap_err();
        assert!(matches!(err, QcError::Confirmation(_)));

        let mut confirmer = TerminalConfirmer::new(Cursor::new(""), Vec::new(), None);
        let err = engine().segment(&phantom(), &mut confirmer).unwrap_err();
        assert!(matches!(err, QcError::Confirmation(_)));
    }
}
