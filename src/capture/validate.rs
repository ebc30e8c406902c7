/// Fail-fast gate over untrusted multipart form input.
///
/// Checks run in a fixed order so that cheap type-shape checks guard the
/// later ones: a wrongly-typed `goal` is rejected before the image is ever
/// looked at, and the size check runs last.
use axum::body::Bytes;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIME: [&str; 2] = ["image/png", "image/jpeg"];

/// One decoded multipart field: either inline text or an uploaded file.
#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// The two fields the capture endpoint cares about, as they arrived.
#[derive(Debug, Default)]
pub struct RawCaptureForm {
    pub goal: Option<FormValue>,
    pub image: Option<FormValue>,
}

/// A request that survived every gate.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub goal: String,
    pub image: FilePart,
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Accepted(CaptureRequest),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: &'static str,
    pub status: u16,
}

const GOAL_TOO_SHORT: Rejection = Rejection {
    reason: "Goal must be at least 2 words.",
    status: 400,
};
const MISSING_IMAGE: Rejection = Rejection {
    reason: "Missing image file.",
    status: 400,
};
const UNSUPPORTED_TYPE: Rejection = Rejection {
    reason: "Only PNG/JPG allowed.",
    status: 415,
};
const TOO_LARGE: Rejection = Rejection {
    reason: "File too large (max 5MB).",
    status: 413,
};

pub fn validate(form: RawCaptureForm) -> ValidationOutcome {
    // 1. goal must be inline text with at least two tokens after trimming
    let goal = match form.goal {
        Some(FormValue::Text(goal)) if goal.trim().split_whitespace().count() >= 2 => {
            goal.trim().to_string()
        }
        _ => return ValidationOutcome::Rejected(GOAL_TOO_SHORT),
    };

    // 2. image must be an uploaded file, not an inline text field
    let image = match form.image {
        Some(FormValue::File(part)) => part,
        _ => return ValidationOutcome::Rejected(MISSING_IMAGE),
    };

    // 3. declared MIME type allow-list
    if !ALLOWED_MIME.contains(&image.content_type.as_str()) {
        return ValidationOutcome::Rejected(UNSUPPORTED_TYPE);
    }

    // 4. size cap last
    if image.bytes.len() > MAX_IMAGE_BYTES {
        return ValidationOutcome::Rejected(TOO_LARGE);
    }

    ValidationOutcome::Accepted(CaptureRequest { goal, image })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_part(len: usize) -> FormValue {
        FormValue::File(FilePart {
            filename: "shot.png".into(),
            content_type: "image/png".into(),
            bytes: Bytes::from(vec![0u8; len]),
        })
    }

    fn rejection(outcome: ValidationOutcome) -> Rejection {
        match outcome {
            ValidationOutcome::Rejected(r) => r,
            ValidationOutcome::Accepted(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn missing_goal_rejected() {
        let outcome = validate(RawCaptureForm {
            goal: None,
            image: Some(png_part(16)),
        });
        let r = rejection(outcome);
        assert_eq!(r.status, 400);
        assert_eq!(r.reason, "Goal must be at least 2 words.");
    }

    #[test]
    fn one_word_goal_rejected() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("  settings  ".into())),
            image: Some(png_part(16)),
        });
        assert_eq!(rejection(outcome).status, 400);
    }

    #[test]
    fn file_typed_goal_rejected_as_goal_error() {
        // A file uploaded under the goal field name is not a string-typed goal.
        let outcome = validate(RawCaptureForm {
            goal: Some(png_part(16)),
            image: Some(png_part(16)),
        });
        assert_eq!(rejection(outcome).reason, "Goal must be at least 2 words.");
    }

    #[test]
    fn goal_error_wins_over_missing_image() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("one".into())),
            image: None,
        });
        assert_eq!(rejection(outcome).reason, "Goal must be at least 2 words.");
    }

    #[test]
    fn missing_image_rejected() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("Open settings menu".into())),
            image: None,
        });
        let r = rejection(outcome);
        assert_eq!(r.status, 400);
        assert_eq!(r.reason, "Missing image file.");
    }

    #[test]
    fn text_typed_image_rejected_as_missing() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("Open settings menu".into())),
            image: Some(FormValue::Text("not a file".into())),
        });
        assert_eq!(rejection(outcome).reason, "Missing image file.");
    }

    #[test]
    fn disallowed_mime_rejected_regardless_of_size() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("Open settings menu".into())),
            image: Some(FormValue::File(FilePart {
                filename: "shot.gif".into(),
                content_type: "image/gif".into(),
                bytes: Bytes::from_static(b"tiny"),
            })),
        });
        let r = rejection(outcome);
        assert_eq!(r.status, 415);
        assert_eq!(r.reason, "Only PNG/JPG allowed.");
    }

    #[test]
    fn oversized_image_rejected() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("Open settings menu".into())),
            image: Some(png_part(MAX_IMAGE_BYTES + 1)),
        });
        let r = rejection(outcome);
        assert_eq!(r.status, 413);
        assert_eq!(r.reason, "File too large (max 5MB).");
    }

    #[test]
    fn exactly_max_size_accepted() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("Open settings menu".into())),
            image: Some(png_part(MAX_IMAGE_BYTES)),
        });
        assert!(matches!(outcome, ValidationOutcome::Accepted(_)));
    }

    #[test]
    fn jpeg_accepted_and_goal_trimmed() {
        let outcome = validate(RawCaptureForm {
            goal: Some(FormValue::Text("  Open settings menu \n".into())),
            image: Some(FormValue::File(FilePart {
                filename: "shot.jpg".into(),
                content_type: "image/jpeg".into(),
                bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF]),
            })),
        });
        match outcome {
            ValidationOutcome::Accepted(req) => {
                assert_eq!(req.goal, "Open settings menu");
                assert_eq!(req.image.content_type, "image/jpeg");
            }
            ValidationOutcome::Rejected(r) => panic!("unexpected rejection: {r:?}"),
        }
    }
}
