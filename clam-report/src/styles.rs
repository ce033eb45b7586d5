//! Colors and inline styles of the printable report.

/// Status box colors for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPalette {
    pub background: &'static str,
    pub text: &'static str,
    pub border: &'static str,
}

pub const ELEVATED: StatusPalette = StatusPalette {
    background: "#fef2f2",
    text: "#991b1b",
    border: "#fecaca",
};

pub const CLEAR: StatusPalette = StatusPalette {
    background: "#f0fdf4",
    text: "#166534",
    border: "#bbf7d0",
};

pub const MODEL_MISSING: StatusPalette = StatusPalette {
    background: "#eee",
    text: "#333",
    border: "#ccc",
};

pub const PAPER: &str = "#FCFBF4";
pub const ACCENT: &str = "#1e3a8a";
pub const MUTED: &str = "#64748b";

pub const SANS: &str = "font-family: Arial, sans-serif;";

pub const PAGE: &str = "background-color: #FCFBF4; color: #1e293b; padding: 50px; \
    border: 1px solid #e2e8f0; font-family: 'Times New Roman', Times, serif; line-height: 1.7;";

pub const PATIENT_TABLE: &str = "margin-bottom: 30px; font-family: Arial, sans-serif; \
    font-size: 0.9em; background: #fff; padding: 15px; border: 1px solid #eee;";

pub const NARRATIVE: &str = "font-size: 1.15em; text-align: justify;";

pub const NARRATIVE_ERROR: &str = "padding: 15px; background-color: #fff7ed; \
    border: 1px solid #fed7aa; color: #9a3412; font-family: Arial, sans-serif;";

pub const DISCLAIMER: &str = "margin-top: 50px; padding: 20px; background-color: #f8fafc; \
    border: 1px solid #cbd5e1; font-size: 0.8em; color: #475569; font-family: Arial, sans-serif;";

pub const SIGNATURE: &str = "text-align: center; font-size: 0.8em; color: #94a3b8; \
    margin-top: 40px; font-family: Arial, sans-serif; border-top: 1px solid #eee; padding-top: 10px;";
