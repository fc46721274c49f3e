//! Fixed design catalogs a site picks from: palettes, fonts, corner radius,
//! hero layouts, loan products and trust badge options.

/// An HSL triple (hue in degrees, saturation and lightness in percent).
pub type Hsl = [u16; 3];

/// A named color palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub id: &'static str,
    pub name: &'static str,
    /// Primary
    pub p: Hsl,
    /// Secondary
    pub s: Hsl,
    /// Accent
    pub a: Hsl,
    /// Page background
    pub bg: Hsl,
    /// Body text
    pub fg: Hsl,
}

impl Palette {
    /// `hsl(h,s%,l%)` for use in CSS declarations.
    pub fn css(hsl: Hsl) -> String {
        format!("hsl({},{}%,{}%)", hsl[0], hsl[1], hsl[2])
    }

    /// `h s% l%` channel form used by CSS custom properties and theme.json.
    pub fn channels(hsl: Hsl) -> String {
        format!("{} {}% {}%", hsl[0], hsl[1], hsl[2])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Font {
    pub id: &'static str,
    pub name: &'static str,
    /// Google Fonts `family=` query value
    pub import: &'static str,
    /// CSS `font-family` head, already quoted
    pub family: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radius {
    pub id: &'static str,
    pub label: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub id: &'static str,
    pub label: &'static str,
    /// Hero arrangement name exported in theme.json
    pub hero: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanType {
    pub id: &'static str,
    pub label: &'static str,
}

pub const COLORS: &[Palette] = &[
    Palette { id: "ocean", name: "Ocean Trust", p: [217, 91, 35], s: [158, 64, 42], a: [15, 92, 62], bg: [210, 40, 98], fg: [222, 47, 11] },
    Palette { id: "forest", name: "Forest Green", p: [152, 68, 28], s: [45, 93, 47], a: [350, 80, 55], bg: [140, 20, 97], fg: [150, 40, 10] },
    Palette { id: "midnight", name: "Midnight Indigo", p: [235, 70, 42], s: [170, 60, 45], a: [25, 95, 58], bg: [230, 25, 97], fg: [235, 50, 12] },
    Palette { id: "ruby", name: "Ruby Finance", p: [350, 75, 38], s: [200, 70, 45], a: [40, 90, 55], bg: [350, 15, 97], fg: [350, 40, 12] },
    Palette { id: "slate", name: "Slate Modern", p: [215, 25, 35], s: [160, 50, 42], a: [15, 85, 55], bg: [210, 15, 97], fg: [215, 30, 12] },
    Palette { id: "coral", name: "Coral Warm", p: [12, 76, 42], s: [185, 60, 40], a: [265, 65, 55], bg: [20, 30, 97], fg: [15, 40, 12] },
    Palette { id: "teal", name: "Teal Pro", p: [180, 65, 30], s: [280, 55, 55], a: [35, 90, 55], bg: [175, 20, 97], fg: [180, 40, 10] },
    Palette { id: "plum", name: "Plum Finance", p: [270, 55, 40], s: [150, 55, 42], a: [20, 88, 58], bg: [270, 15, 97], fg: [270, 40, 12] },
];

pub const FONTS: &[Font] = &[
    Font { id: "dm-sans", name: "DM Sans", import: "DM+Sans:opsz,wght@9..40,400;9..40,600;9..40,700", family: "\"DM Sans\"" },
    Font { id: "plus-jakarta", name: "Plus Jakarta Sans", import: "Plus+Jakarta+Sans:wght@400;600;700", family: "\"Plus Jakarta Sans\"" },
    Font { id: "outfit", name: "Outfit", import: "Outfit:wght@400;500;600;700", family: "\"Outfit\"" },
    Font { id: "manrope", name: "Manrope", import: "Manrope:wght@400;500;600;700;800", family: "\"Manrope\"" },
    Font { id: "sora", name: "Sora", import: "Sora:wght@400;500;600;700", family: "\"Sora\"" },
    Font { id: "figtree", name: "Figtree", import: "Figtree:wght@400;500;600;700", family: "\"Figtree\"" },
    Font { id: "inter", name: "Inter", import: "Inter:wght@400;500;600;700", family: "\"Inter\"" },
    Font { id: "space-grotesk", name: "Space Grotesk", import: "Space+Grotesk:wght@400;500;600;700", family: "\"Space Grotesk\"" },
];

pub const RADIUS: &[Radius] = &[
    Radius { id: "sharp", label: "Sharp", value: "0rem" },
    Radius { id: "subtle", label: "Subtle", value: "0.375rem" },
    Radius { id: "rounded", label: "Rounded", value: "0.75rem" },
    Radius { id: "pill", label: "Pill", value: "1.5rem" },
];

pub const LAYOUTS: &[Layout] = &[
    Layout { id: "hero-left", label: "Hero Left + Form Right", hero: "form-right" },
    Layout { id: "hero-center", label: "Hero Center + Form Below", hero: "form-below" },
    Layout { id: "hero-full", label: "Full Width Hero", hero: "form-overlap" },
];

pub const LOAN_TYPES: &[LoanType] = &[
    LoanType { id: "personal", label: "Personal Loans" },
    LoanType { id: "installment", label: "Installment Loans" },
    LoanType { id: "pet", label: "Pet Care Financing" },
    LoanType { id: "medical", label: "Medical Financing" },
    LoanType { id: "auto", label: "Auto Loans" },
    LoanType { id: "custom", label: "Custom / Other" },
];

/// Trust badge rendering styles.
pub const TRUST_BADGE_STYLES: &[&str] = &["compact", "cards", "both"];

/// Which palette channel tints the trust badge icons.
pub const TRUST_BADGE_ICON_TONES: &[&str] = &["primary", "accent", "secondary"];

pub fn color(id: &str) -> &'static Palette {
    COLORS.iter().find(|c| c.id == id).unwrap_or(&COLORS[0])
}

pub fn font(id: &str) -> &'static Font {
    FONTS.iter().find(|f| f.id == id).unwrap_or(&FONTS[0])
}

pub fn radius(id: &str) -> &'static Radius {
    RADIUS.iter().find(|r| r.id == id).unwrap_or(&RADIUS[2])
}

pub fn layout(id: &str) -> &'static Layout {
    LAYOUTS.iter().find(|l| l.id == id).unwrap_or(&LAYOUTS[0])
}

/// Display label for a loan type id; unknown ids read as personal loans.
pub fn loan_label(id: &str) -> &'static str {
    LOAN_TYPES
        .iter()
        .find(|l| l.id == id)
        .map_or(LOAN_TYPES[0].label, |l| l.label)
}
