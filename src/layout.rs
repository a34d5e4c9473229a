//! Fixed page geometry and paragraph styles.

/// Twentieths of a point, the unit WordprocessingML uses for page geometry.
pub const TWIPS_PER_INCH: f64 = 1440.0;
/// English Metric Units, the unit DrawingML uses for picture extents.
pub const EMU_PER_INCH: f64 = 914_400.0;
const CM_PER_INCH: f64 = 2.54;

pub fn cm_to_twips(cm: f64) -> u32 {
    (cm / CM_PER_INCH * TWIPS_PER_INCH).round() as u32
}

pub fn inches_to_emu(inches: f64) -> u64 {
    (inches * EMU_PER_INCH).round() as u64
}

/// Page size and margins in twips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetup {
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    pub header: u32,
    pub footer: u32,
}

impl Default for PageSetup {
    /// A4 portrait with a wider binding margin on the left.
    fn default() -> Self {
        Self {
            width: cm_to_twips(21.0),
            height: cm_to_twips(29.7),
            top: cm_to_twips(1.5),
            bottom: cm_to_twips(1.5),
            left: cm_to_twips(2.0),
            right: cm_to_twips(1.0),
            header: cm_to_twips(1.0),
            footer: cm_to_twips(1.0),
        }
    }
}

impl PageSetup {
    /// Width available between the left and right margins.
    pub fn text_width(&self) -> u32 {
        self.width.saturating_sub(self.left + self.right)
    }
}

pub const LATIN_FONT: &str = "Times New Roman";
pub const EAST_ASIA_FONT: &str = "宋体";
/// 1.5 line spacing in 240ths of a line.
pub const LINE_SPACING: u32 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    /// Unstyled paragraph; table cells start with one.
    Normal,
    Title,
    Section,
    Body,
    Option,
}

impl ParagraphStyle {
    /// Styles written to `styles.xml`, in order.
    pub const NAMED: [ParagraphStyle; 4] = [
        ParagraphStyle::Title,
        ParagraphStyle::Section,
        ParagraphStyle::Body,
        ParagraphStyle::Option,
    ];

    pub fn style_id(self) -> &'static str {
        match self {
            ParagraphStyle::Normal => "Normal",
            ParagraphStyle::Title => "TitleStyle",
            ParagraphStyle::Section => "SectionStyle",
            ParagraphStyle::Body => "BodyStyle",
            ParagraphStyle::Option => "OptionStyle",
        }
    }

    pub fn bold(self) -> bool {
        matches!(self, ParagraphStyle::Title | ParagraphStyle::Section)
    }

    /// Font size in half-points.
    pub fn half_points(self) -> u32 {
        match self {
            ParagraphStyle::Title => 28,
            ParagraphStyle::Section => 24,
            ParagraphStyle::Normal | ParagraphStyle::Body | ParagraphStyle::Option => 21,
        }
    }

    pub fn alignment(self) -> Alignment {
        match self {
            ParagraphStyle::Title => Alignment::Center,
            _ => Alignment::Justify,
        }
    }
}
