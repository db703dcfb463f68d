//! The sRGB output-intent profile embedded in every assembled document.

use thiserror::Error;

/// Bundled sRGB ICC profile (gamma-curve variant, D50-adapted primaries)
const SRGB_ICC: &[u8] = include_bytes!("../assets/sRGB.icc");

/// Color profile errors (startup-time only; a loaded profile never fails)
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("ICC profile too short: {0} bytes")]
    Truncated(usize),

    #[error("ICC profile corrupt: {0}")]
    Corrupt(String),
}

/// An ICC color profile plus the strings the PDF output intent needs.
///
/// The profile is a static resource; construction validates the ICC header
/// so a broken asset fails at startup rather than inside a checkpoint
/// write.
#[derive(Debug, Clone)]
pub struct ColorProfile {
    bytes: Vec<u8>,
}

impl ColorProfile {
    /// The bundled sRGB profile
    pub fn srgb() -> Result<Self, ProfileError> {
        Self::new(SRGB_ICC.to_vec())
    }

    /// Validate an ICC profile header and wrap the bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, ProfileError> {
        if bytes.len() < 132 {
            return Err(ProfileError::Truncated(bytes.len()));
        }
        let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if declared != bytes.len() {
            return Err(ProfileError::Corrupt(format!(
                "header size {declared} does not match {} bytes",
                bytes.len()
            )));
        }
        if &bytes[36..40] != b"acsp" {
            return Err(ProfileError::Corrupt("missing 'acsp' signature".to_string()));
        }
        if &bytes[16..20] != b"RGB " {
            return Err(ProfileError::Corrupt("not an RGB profile".to_string()));
        }
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of color components (N entry of the PDF stream dictionary)
    #[must_use]
    pub fn components(&self) -> i64 {
        3
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        "sRGB"
    }

    #[must_use]
    pub fn condition_identifier(&self) -> &'static str {
        "sRGB"
    }

    #[must_use]
    pub fn registry(&self) -> &'static str {
        "http://www.color.org"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_profile_is_valid() {
        let profile = ColorProfile::srgb().unwrap();
        assert!(profile.bytes().len() >= 132);
        assert_eq!(profile.components(), 3);
    }

    #[test]
    fn test_truncated_profile_rejected() {
        assert!(matches!(
            ColorProfile::new(vec![0; 10]),
            Err(ProfileError::Truncated(10))
        ));
    }

    #[test]
    fn test_corrupt_signature_rejected() {
        let mut bytes = SRGB_ICC.to_vec();
        bytes[36] = b'x';
        assert!(matches!(
            ColorProfile::new(bytes),
            Err(ProfileError::Corrupt(_))
        ));
    }
}
