//! Print pipeline errors.
//!
//! `Display` output is the operator-facing Arabic message shown under the
//! ticket's print button; `category()` is the stable code used in command
//! payloads and logs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintError {
    /// Connect failure or client-side timeout.
    #[error(
        "تعذر الاتصال بالطابعة ({address})\n• تأكد أن الطابعة شغالة\n• الجهاز على نفس الشبكة\n• SSL مفعّل على الطابعة"
    )]
    Unreachable { address: String, reason: String },

    /// The printer answered with a non-2xx status.
    #[error("رفضت الطابعة الطلب ({status})")]
    Rejected { status: u16 },

    /// The printer answered but ePOS-Print is disabled or the device id is wrong.
    #[error("تأكد من تفعيل ePOS-Print على الطابعة ({marker})")]
    NotConfigured { marker: String },

    /// ePOS accepted the request but the device reported a failure
    /// (cover open, paper end, ...).
    #[error("الطابعة أبلغت عن خطأ: {code}")]
    Device { code: String },

    #[error("تعذر تجهيز التذكرة: {0}")]
    Render(String),

    #[error("خطأ: {0}")]
    Transport(String),
}

impl PrintError {
    pub fn category(&self) -> &'static str {
        match self {
            PrintError::Unreachable { .. } => "printer_unreachable",
            PrintError::Rejected { .. } => "printer_rejected",
            PrintError::NotConfigured { .. } => "printer_not_configured",
            PrintError::Device { .. } => "printer_device_error",
            PrintError::Render(_) => "render_failed",
            PrintError::Transport(_) => "transport_error",
        }
    }

    /// Whether pressing print again may succeed without operator changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PrintError::Unreachable { .. } | PrintError::Device { .. }
        )
    }
}

pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_message_names_address_and_remediation() {
        let err = PrintError::Unreachable {
            address: "192.168.100.205".into(),
            reason: "timed out".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("192.168.100.205"));
        assert!(msg.contains("SSL"));
        assert_eq!(msg.lines().count(), 4);
        assert_eq!(err.category(), "printer_unreachable");
        assert!(err.is_transient());
    }

    #[test]
    fn rejected_message_includes_status() {
        let err = PrintError::Rejected { status: 500 };
        assert!(err.to_string().contains("500"));
        assert_eq!(err.category(), "printer_rejected");
        assert!(!err.is_transient());
    }
}
