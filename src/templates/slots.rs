//! Named-slot template language.
//!
//! Template sources are plain HTML/Astro text with two kinds of tags:
//!
//! * `{{name}}` inserts a slot value. The slot's [`SlotKind`] decides how the
//!   value is treated (escaped text, allow-listed URL, theme token or trusted
//!   generated markup).
//! * `{{#if name}}…{{else}}…{{/if}}` keeps one branch depending on a
//!   condition: a slot with a non-empty value, or one of the output flags
//!   `astro` / `preview`.
//!
//! Parsing never fails. Anything between braces that is not a recognised tag
//! (an unknown slot name, a JSX object literal, a stray `{{/if}}`) is kept as
//! [`Node::Verbatim`] and emitted unchanged.

use tracing::warn;

/// How a slot value is treated before it is written into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// User text, HTML-escaped
    Text,
    /// User URL, passed through the redirect allow-list then escaped
    Url,
    /// Palette, font and radius tokens from the fixed design catalogs
    Theme,
    /// Snippets generated by this crate from validated input
    Markup,
}

/// Every value a template can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Brand,
    Domain,
    Tagline,
    Email,
    H1,
    Badge,
    Cta,
    Sub,
    LoanLabel,
    AmountMin,
    AmountMax,
    AmountMid,
    AmountMaxDisplay,
    AprMin,
    AprMax,
    Year,
    Lang,
    SiteId,
    Network,
    Aid,
    FormStartLabel,
    FormSubmitLabel,
    Favicon,
    OgImage,

    RedirectUrl,
    SiteUrl,
    ApplyUrl,

    Primary,
    Secondary,
    Accent,
    Background,
    Foreground,
    PrimaryHsl,
    SecondaryHsl,
    AccentHsl,
    BackgroundHsl,
    ForegroundHsl,
    BadgeTone,
    Radius,
    FontFamily,
    FontImport,
    HeroLayout,

    RobotsMeta,
    GtmHead,
    GtmBody,
    AdsTag,
    VoluumTag,
    TrackingJson,
    TrustBadges,
    Faq,
    LeadForm,
}

const SLOT_NAMES: &[(&str, Slot)] = &[
    ("brand", Slot::Brand),
    ("domain", Slot::Domain),
    ("tagline", Slot::Tagline),
    ("email", Slot::Email),
    ("h1", Slot::H1),
    ("badge", Slot::Badge),
    ("cta", Slot::Cta),
    ("sub", Slot::Sub),
    ("loan_label", Slot::LoanLabel),
    ("amount_min", Slot::AmountMin),
    ("amount_max", Slot::AmountMax),
    ("amount_mid", Slot::AmountMid),
    ("amount_max_display", Slot::AmountMaxDisplay),
    ("apr_min", Slot::AprMin),
    ("apr_max", Slot::AprMax),
    ("year", Slot::Year),
    ("lang", Slot::Lang),
    ("site_id", Slot::SiteId),
    ("network", Slot::Network),
    ("aid", Slot::Aid),
    ("form_start_label", Slot::FormStartLabel),
    ("form_submit_label", Slot::FormSubmitLabel),
    ("favicon", Slot::Favicon),
    ("og_image", Slot::OgImage),
    ("redirect_url", Slot::RedirectUrl),
    ("site_url", Slot::SiteUrl),
    ("apply_url", Slot::ApplyUrl),
    ("primary", Slot::Primary),
    ("secondary", Slot::Secondary),
    ("accent", Slot::Accent),
    ("background", Slot::Background),
    ("foreground", Slot::Foreground),
    ("primary_hsl", Slot::PrimaryHsl),
    ("secondary_hsl", Slot::SecondaryHsl),
    ("accent_hsl", Slot::AccentHsl),
    ("background_hsl", Slot::BackgroundHsl),
    ("foreground_hsl", Slot::ForegroundHsl),
    ("badge_tone", Slot::BadgeTone),
    ("radius", Slot::Radius),
    ("font_family", Slot::FontFamily),
    ("font_import", Slot::FontImport),
    ("hero_layout", Slot::HeroLayout),
    ("robots_meta", Slot::RobotsMeta),
    ("gtm_head", Slot::GtmHead),
    ("gtm_body", Slot::GtmBody),
    ("ads_tag", Slot::AdsTag),
    ("voluum_tag", Slot::VoluumTag),
    ("tracking_json", Slot::TrackingJson),
    ("trust_badges", Slot::TrustBadges),
    ("faq", Slot::Faq),
    ("lead_form", Slot::LeadForm),
];

impl Slot {
    pub fn from_name(name: &str) -> Option<Slot> {
        SLOT_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, slot)| *slot)
    }

    pub fn name(self) -> &'static str {
        SLOT_NAMES
            .iter()
            .find(|(_, slot)| *slot == self)
            .map_or("?", |(n, _)| n)
    }

    pub fn kind(self) -> SlotKind {
        use Slot::*;
        match self {
            RedirectUrl | SiteUrl | ApplyUrl => SlotKind::Url,
            Primary | Secondary | Accent | Background | Foreground | PrimaryHsl | SecondaryHsl
            | AccentHsl | BackgroundHsl | ForegroundHsl | BadgeTone | Radius | FontFamily
            | FontImport | HeroLayout => SlotKind::Theme,
            RobotsMeta | GtmHead | GtmBody | AdsTag | VoluumTag | TrackingJson | TrustBadges
            | Faq | LeadForm => SlotKind::Markup,
            _ => SlotKind::Text,
        }
    }
}

/// Output flags usable as section conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Astro,
    Preview,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Flag(Flag),
    Filled(Slot),
    /// Unrecognised name; always false
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Slot(Slot),
    Section {
        when: Condition,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// Source text kept exactly as written
    Verbatim(String),
}

struct Frame {
    when: Condition,
    then: Vec<Node>,
    otherwise: Vec<Node>,
    in_else: bool,
}

impl Frame {
    fn push(&mut self, node: Node) {
        if self.in_else {
            self.otherwise.push(node);
        } else {
            self.then.push(node);
        }
    }

    fn into_node(self) -> Node {
        Node::Section {
            when: self.when,
            then: self.then,
            otherwise: self.otherwise,
        }
    }
}

/// Parses a template source into nodes.
pub fn parse(source: &str) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut rest = source;

    fn emit(root: &mut Vec<Node>, stack: &mut [Frame], node: Node) {
        match stack.last_mut() {
            Some(frame) => frame.push(node),
            None => root.push(node),
        }
    }

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            emit(&mut root, &mut stack, Node::Text(rest[..open].to_string()));
        }
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            emit(&mut root, &mut stack, Node::Verbatim(rest[open..].to_string()));
            rest = "";
            break;
        };
        let raw = &rest[open..open + 2 + close + 2];
        let tag = after_open[..close].trim();
        rest = &after_open[close + 2..];

        if let Some(name) = tag.strip_prefix("#if ") {
            stack.push(Frame {
                when: condition(name.trim()),
                then: Vec::new(),
                otherwise: Vec::new(),
                in_else: false,
            });
        } else if tag == "else" {
            match stack.last_mut() {
                Some(frame) if !frame.in_else => frame.in_else = true,
                _ => emit(&mut root, &mut stack, Node::Verbatim(raw.to_string())),
            }
        } else if tag == "/if" {
            match stack.pop() {
                Some(frame) => emit(&mut root, &mut stack, frame.into_node()),
                None => root.push(Node::Verbatim(raw.to_string())),
            }
        } else if is_identifier(tag) {
            match Slot::from_name(tag) {
                Some(slot) => emit(&mut root, &mut stack, Node::Slot(slot)),
                None => {
                    warn!(slot = tag, "Unknown template slot left as written");
                    emit(&mut root, &mut stack, Node::Verbatim(raw.to_string()));
                }
            }
        } else {
            emit(&mut root, &mut stack, Node::Verbatim(raw.to_string()));
        }
    }

    if !rest.is_empty() {
        emit(&mut root, &mut stack, Node::Text(rest.to_string()));
    }

    if !stack.is_empty() {
        warn!(open = stack.len(), "Template ends with unclosed sections; closing them");
    }
    while let Some(frame) = stack.pop() {
        emit(&mut root, &mut stack, frame.into_node());
    }

    root
}

fn condition(name: &str) -> Condition {
    match name {
        "astro" => Condition::Flag(Flag::Astro),
        "preview" => Condition::Flag(Flag::Preview),
        other => match Slot::from_name(other) {
            Some(slot) => Condition::Filled(slot),
            None => {
                warn!(condition = other, "Unknown section condition, treated as false");
                Condition::Unknown(other.to_string())
            }
        },
    }
}

fn is_identifier(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_are_unique_and_round_trip() {
        for (name, slot) in SLOT_NAMES {
            assert_eq!(Slot::from_name(name), Some(*slot));
            assert_eq!(slot.name(), *name);
        }
        assert_eq!(Slot::RedirectUrl.kind(), SlotKind::Url);
        assert_eq!(Slot::Brand.kind(), SlotKind::Text);
        assert_eq!(Slot::Primary.kind(), SlotKind::Theme);
        assert_eq!(Slot::GtmHead.kind(), SlotKind::Markup);
    }

    #[test]
    fn parses_text_and_slots() {
        let nodes = parse("<h1>{{brand}}</h1>");
        assert_eq!(
            nodes,
            vec![
                Node::Text("<h1>".to_string()),
                Node::Slot(Slot::Brand),
                Node::Text("</h1>".to_string()),
            ]
        );
    }

    #[test]
    fn parses_nested_sections_with_else() {
        let nodes = parse("{{#if preview}}a{{#if badge}}b{{/if}}{{else}}c{{/if}}");
        let [Node::Section { when, then, otherwise }] = nodes.as_slice() else {
            panic!("expected one section, got {nodes:?}");
        };
        assert_eq!(*when, Condition::Flag(Flag::Preview));
        assert_eq!(then.len(), 2);
        assert!(matches!(&then[1], Node::Section { when: Condition::Filled(Slot::Badge), .. }));
        assert_eq!(otherwise, &vec![Node::Text("c".to_string())]);
    }

    #[test]
    fn unknown_and_foreign_tags_stay_verbatim() {
        let nodes = parse("{{mystery}} style={{ color: 'red' }} {{/if}} {{else}}");
        let verbatim: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                Node::Verbatim(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            verbatim,
            vec!["{{mystery}}", "{{ color: 'red' }}", "{{/if}}", "{{else}}"]
        );
    }

    #[test]
    fn unterminated_tag_and_section_are_tolerated() {
        let nodes = parse("x {{brand");
        assert_eq!(nodes.last(), Some(&Node::Verbatim("{{brand".to_string())));

        let nodes = parse("{{#if astro}}open");
        assert!(matches!(
            nodes.as_slice(),
            [Node::Section { when: Condition::Flag(Flag::Astro), .. }]
        ));
    }

    #[test]
    fn unknown_condition_is_recorded() {
        let nodes = parse("{{#if nope}}x{{/if}}");
        assert!(matches!(
            &nodes[0],
            Node::Section { when: Condition::Unknown(name), .. } if name == "nope"
        ));
    }

    #[test]
    fn single_braces_are_plain_text() {
        let css = ".a { color: red; }";
        assert_eq!(parse(css), vec![Node::Text(css.to_string())]);
    }
}
