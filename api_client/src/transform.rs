//! Delivery URL transformations.

use std::fmt;

/// How the delivered image is fitted into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Fill the whole box, cropping whatever overflows.
    Fill,
    /// Scale down to fit inside the box, never up.
    Limit,
}

impl fmt::Display for CropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropMode::Fill => write!(f, "fill"),
            CropMode::Limit => write!(f, "limit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    Auto,
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gravity::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub width: u32,
    pub height: u32,
    pub crop: CropMode,
    pub gravity: Option<Gravity>,
}

impl TransformOptions {
    /// Square grid thumbnail.
    pub fn thumbnail() -> Self {
        TransformOptions {
            width: 300,
            height: 300,
            crop: CropMode::Fill,
            gravity: Some(Gravity::Auto),
        }
    }

    /// Bounded size used for the enlarged view.
    pub fn full_size() -> Self {
        TransformOptions {
            width: 1200,
            height: 800,
            crop: CropMode::Limit,
            gravity: None,
        }
    }

    /// Render the transformation path segment. Quality and format are always
    /// left to the delivery network; parameters are emitted in key order.
    pub fn to_path_segment(&self) -> String {
        let mut parts = vec![format!("c_{}", self.crop), "f_auto".to_string()];
        if let Some(gravity) = self.gravity {
            parts.push(format!("g_{}", gravity));
        }
        parts.push(format!("h_{}", self.height));
        parts.push("q_auto".to_string());
        parts.push(format!("w_{}", self.width));
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_segment() {
        assert_eq!(
            TransformOptions::thumbnail().to_path_segment(),
            "c_fill,f_auto,g_auto,h_300,q_auto,w_300"
        );
    }

    #[test]
    fn full_size_segment_has_no_gravity() {
        assert_eq!(
            TransformOptions::full_size().to_path_segment(),
            "c_limit,f_auto,h_800,q_auto,w_1200"
        );
    }
}
