//! Verification capabilities routed by the orchestrator
//!
//! A capability is a named unit of verification work. Providers declare the
//! capabilities they can fulfill; callers request one per logical request.

use serde::{Deserialize, Serialize};

/// A verification sub-task that can be routed to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Identity document OCR and field extraction
    DocumentOcr,
    /// Selfie-to-document face comparison
    FaceMatch,
    /// Liveness / presentation-attack detection
    Liveness,
    /// Sanctions, PEP and adverse-media watchlist screening
    WatchlistScreen,
    /// Postal address verification
    AddressVerification,
    /// Phone number verification
    PhoneVerification,
}

impl Capability {
    /// All known capabilities, in routing-report order
    pub const ALL: [Capability; 6] = [
        Capability::DocumentOcr,
        Capability::FaceMatch,
        Capability::Liveness,
        Capability::WatchlistScreen,
        Capability::AddressVerification,
        Capability::PhoneVerification,
    ];

    /// Stable wire name (matches the serde representation)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentOcr => "document-ocr",
            Self::FaceMatch => "face-match",
            Self::Liveness => "liveness",
            Self::WatchlistScreen => "watchlist-screen",
            Self::AddressVerification => "address-verification",
            Self::PhoneVerification => "phone-verification",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::Error::Config(format!("unknown capability: {s}")))
    }
}
