use crate::{Result, SourceError};

/// Interstitial signatures that appear in the `<title>` of challenge pages.
const TITLE_MARKERS: &[&str] = &[
    "just a moment",
    "please wait",
    "checking your browser",
    "attention required!",
    "access denied",
];

/// Signatures that appear anywhere in a challenge document.
const BODY_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "challenge-form",
    "ddos protection by",
    "verify you are human",
];

/// Inspect a fetched document for known anti-bot challenge markers.
///
/// Challenge pages are well-formed documents that would otherwise parse
/// "successfully" into empty entities, so adapters call this before any
/// structural parsing. `expected_title` adds a per-source signature on top of
/// the shared list.
pub fn check_challenge(document: &str, expected_title: Option<&str>) -> Result<()> {
    let title = document_title(document).map(|t| t.to_lowercase());

    if let Some(title) = &title {
        for marker in TITLE_MARKERS {
            if title.contains(marker) {
                return Err(SourceError::ChallengeDetected {
                    marker: (*marker).to_string(),
                });
            }
        }
        if let Some(expected) = expected_title {
            if title.contains(&expected.to_lowercase()) {
                return Err(SourceError::ChallengeDetected {
                    marker: expected.to_string(),
                });
            }
        }
    }

    let lower = document.to_lowercase();
    for marker in BODY_MARKERS {
        if lower.contains(marker) {
            return Err(SourceError::ChallengeDetected {
                marker: (*marker).to_string(),
            });
        }
    }

    Ok(())
}

fn document_title(document: &str) -> Option<&str> {
    let open = document.find("<title")?;
    let rest = &document[open..];
    let start = rest.find('>')? + 1;
    let end = rest[start..].find("</title")?;
    Some(rest[start..start + end].trim())
}
