//! Slot evaluation and the output-safety helpers every generator shares.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;

use super::markup;
use super::slots::{Condition, Flag, Node, Slot, SlotKind, parse};
use crate::generate::assets;
use crate::models::design::{self, Font, Palette};
use crate::models::{SiteConfig, non_empty};

static GTM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GTM-[A-Z0-9]+$").expect("gtm pattern"));

static CONVERSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^AW-\d+$").expect("conversion id pattern"));

static ASTRO_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+is:(?:inline|global)\b").expect("directive pattern"));

pub const PREVIEW_BRAND: &str = "Your Brand";
pub const PREVIEW_DOMAIN: &str = "example.com";

/// Entity-encodes `& < > " '`.
pub fn esc(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Allow-list for link targets: `http(s)://`, same-origin paths and in-page
/// anchors. Anything else, protocol-relative `//host` included, becomes `#`.
/// The result is not escaped.
pub fn sanitize_url(url: &str) -> String {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || (trimmed.starts_with('/') && !trimmed.starts_with("//"))
        || trimmed.starts_with('#')
    {
        trimmed.to_string()
    } else {
        "#".to_string()
    }
}

/// Google Tag Manager container id, if well-formed.
pub fn valid_gtm_id(id: &str) -> Option<&str> {
    let id = id.trim();
    GTM_ID_RE.is_match(id).then_some(id)
}

/// Google Ads conversion id (`AW-123…`), if well-formed.
pub fn valid_conversion_id(id: &str) -> Option<&str> {
    let id = id.trim();
    CONVERSION_ID_RE.is_match(id).then_some(id)
}

/// JSON string literal safe to place inside an inline `<script>`.
pub fn js_string(value: &str) -> String {
    script_safe(&serde_json::Value::String(value.to_string()).to_string())
}

/// Escapes the characters that could end a `<script>` element early.
pub fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// `lang` attribute for the site language name.
pub fn lang_code(lang: &str) -> &'static str {
    match lang.trim().to_ascii_lowercase().as_str() {
        "spanish" | "es" => "es",
        "french" | "fr" => "fr",
        "german" | "de" => "de",
        "portuguese" | "pt" => "pt",
        "italian" | "it" => "it",
        "thai" | "th" => "th",
        _ => "en",
    }
}

/// `1234567` -> `1,234,567`, `99.5` -> `99.5`. At most three decimals.
pub fn thousands(n: f64) -> String {
    let fixed = format!("{:.3}", n.abs());
    let (digits, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut out = String::with_capacity(fixed.len() + digits.len() / 3 + 1);
    if n < 0.0 && (digits != "0" || !fraction.is_empty()) {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

/// Which output a template is being rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single self-contained HTML document
    Preview,
    /// Page inside a generated Astro project
    Astro,
}

/// Everything a template can read while rendering one site.
pub struct RenderContext<'a> {
    pub site: &'a SiteConfig,
    pub mode: Mode,
    pub palette: &'static Palette,
    pub font: &'static Font,
}

impl<'a> RenderContext<'a> {
    pub fn new(site: &'a SiteConfig, mode: Mode) -> Self {
        Self {
            site,
            mode,
            palette: design::color(&site.color_id),
            font: design::font(&site.font_id),
        }
    }

    pub fn brand(&self) -> &'a str {
        non_empty(&self.site.brand).unwrap_or(PREVIEW_BRAND)
    }

    pub fn domain(&self) -> &'a str {
        non_empty(&self.site.domain).unwrap_or(PREVIEW_DOMAIN)
    }

    /// Slot value before its kind is applied.
    pub fn raw(&self, slot: Slot) -> Cow<'a, str> {
        let site = self.site;
        let c = self.palette;
        match slot {
            Slot::Brand => Cow::Borrowed(self.brand()),
            Slot::Domain => Cow::Borrowed(self.domain()),
            Slot::Tagline => Cow::Borrowed(non_empty(&site.tagline).unwrap_or("Fast, simple, trusted.")),
            Slot::Email => match non_empty(&site.email) {
                Some(email) => Cow::Borrowed(email),
                None => Cow::Owned(format!("support@{}", self.domain())),
            },
            Slot::H1 => match non_empty(&site.h1) {
                Some(h1) => Cow::Borrowed(h1),
                None => Cow::Owned(format!(
                    "Get {} up to ${}",
                    design::loan_label(&site.loan_type),
                    thousands(site.amount_max)
                )),
            },
            Slot::Badge => Cow::Borrowed(site.badge.trim()),
            Slot::Cta => Cow::Borrowed(non_empty(&site.cta).unwrap_or("Check My Rate")),
            Slot::Sub => Cow::Borrowed(
                non_empty(&site.sub)
                    .unwrap_or("Compare lender offers in minutes with no impact to your credit score."),
            ),
            Slot::LoanLabel => Cow::Borrowed(design::loan_label(&site.loan_type)),
            Slot::AmountMin => Cow::Owned(site.amount_min.to_string()),
            Slot::AmountMax => Cow::Owned(site.amount_max.to_string()),
            Slot::AmountMid => Cow::Owned(site.amount_mid().to_string()),
            Slot::AmountMaxDisplay => Cow::Owned(thousands(site.amount_max)),
            Slot::AprMin => Cow::Owned(site.apr_min.to_string()),
            Slot::AprMax => Cow::Owned(site.apr_max.to_string()),
            Slot::Year => Cow::Owned(Utc::now().year().to_string()),
            Slot::Lang => Cow::Borrowed(lang_code(&site.lang)),
            Slot::SiteId => Cow::Owned(site.short_id(8)),
            Slot::Network => Cow::Borrowed(site.network.trim()),
            Slot::Aid => Cow::Borrowed(site.aid.trim()),
            Slot::FormStartLabel => Cow::Borrowed(non_empty(&site.form_start_label).unwrap_or("Form Start")),
            Slot::FormSubmitLabel => Cow::Borrowed(non_empty(&site.form_submit_label).unwrap_or("Form Submit")),
            Slot::Favicon => match non_empty(&site.favicon_data_url) {
                Some(url) => Cow::Borrowed(url),
                None => Cow::Owned(assets::svg_data_url(&assets::favicon_svg(site))),
            },
            Slot::OgImage => match non_empty(&site.og_image_data_url) {
                Some(url) => Cow::Borrowed(url),
                None => Cow::Owned(format!("https://{}/og.jpg", self.domain())),
            },

            Slot::RedirectUrl => match non_empty(&site.redirect_url) {
                Some(url) => Cow::Owned(sanitize_url(url)),
                None => Cow::Borrowed(""),
            },
            Slot::SiteUrl => Cow::Owned(format!("https://{}/", self.domain())),
            Slot::ApplyUrl => Cow::Borrowed(match self.mode {
                Mode::Astro => "/apply",
                Mode::Preview => "#apply",
            }),

            Slot::Primary => Cow::Owned(Palette::css(c.p)),
            Slot::Secondary => Cow::Owned(Palette::css(c.s)),
            Slot::Accent => Cow::Owned(Palette::css(c.a)),
            Slot::Background => Cow::Owned(Palette::css(c.bg)),
            Slot::Foreground => Cow::Owned(Palette::css(c.fg)),
            Slot::PrimaryHsl => Cow::Owned(Palette::channels(c.p)),
            Slot::SecondaryHsl => Cow::Owned(Palette::channels(c.s)),
            Slot::AccentHsl => Cow::Owned(Palette::channels(c.a)),
            Slot::BackgroundHsl => Cow::Owned(Palette::channels(c.bg)),
            Slot::ForegroundHsl => Cow::Owned(Palette::channels(c.fg)),
            Slot::BadgeTone => Cow::Owned(self.badge_tone()),
            Slot::Radius => Cow::Borrowed(design::radius(&site.radius).value),
            Slot::FontFamily => Cow::Borrowed(self.font.family),
            Slot::FontImport => Cow::Borrowed(self.font.import),
            Slot::HeroLayout => Cow::Borrowed(design::layout(&site.layout).hero),

            Slot::RobotsMeta => Cow::Owned(markup::robots_meta(site)),
            Slot::GtmHead => Cow::Owned(markup::gtm_head(site)),
            Slot::GtmBody => Cow::Owned(markup::gtm_body(site)),
            Slot::AdsTag => Cow::Owned(markup::ads_tag(site)),
            Slot::VoluumTag => Cow::Owned(markup::voluum_tag(site)),
            Slot::TrackingJson => Cow::Owned(markup::tracking_json(site)),
            Slot::TrustBadges => Cow::Owned(markup::trust_badges(site, &self.badge_tone())),
            Slot::Faq => Cow::Owned(markup::faq(site)),
            Slot::LeadForm => Cow::Owned(markup::lead_form(site)),
        }
    }

    /// Slot value ready to be written into the page.
    pub fn value(&self, slot: Slot) -> String {
        let raw = self.raw(slot);
        match slot.kind() {
            SlotKind::Text => esc(&raw),
            SlotKind::Url => esc(&sanitize_url(&raw)),
            SlotKind::Theme | SlotKind::Markup => raw.into_owned(),
        }
    }

    pub fn holds(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Flag(Flag::Astro) => self.mode == Mode::Astro,
            Condition::Flag(Flag::Preview) => self.mode == Mode::Preview,
            Condition::Filled(slot) => !self.raw(*slot).trim().is_empty(),
            Condition::Unknown(_) => false,
        }
    }

    fn badge_tone(&self) -> String {
        let c = self.palette;
        let hsl = match self.site.trust_badge_icon_tone.as_str() {
            "accent" => c.a,
            "secondary" => c.s,
            _ => c.p,
        };
        Palette::css(hsl)
    }
}

pub fn render_nodes(nodes: &[Node], ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();
    write_nodes(nodes, ctx, &mut out);
    out
}

fn write_nodes(nodes: &[Node], ctx: &RenderContext<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) | Node::Verbatim(text) => out.push_str(text),
            Node::Slot(slot) => out.push_str(&ctx.value(*slot)),
            Node::Section {
                when,
                then,
                otherwise,
            } => {
                let branch = if ctx.holds(when) { then } else { otherwise };
                write_nodes(branch, ctx, out);
            }
        }
    }
}

/// Parses and renders a template source.
pub fn render_source(source: &str, ctx: &RenderContext<'_>) -> String {
    render_nodes(&parse(source), ctx)
}

/// Turns a rendered Astro page into plain HTML: drops the leading
/// frontmatter fence and Astro-only `is:inline` / `is:global` directives.
pub fn flatten_preview(page: &str) -> String {
    let body = strip_frontmatter(page);
    ASTRO_DIRECTIVE_RE.replace_all(body, "").into_owned()
}

fn strip_frontmatter(page: &str) -> &str {
    let trimmed = page.trim_start();
    let Some(after) = trimmed.strip_prefix("---") else {
        return page;
    };
    if !after.starts_with('\n') && !after.starts_with("\r\n") {
        return page;
    }
    let mut offset = 0;
    for line in after.split_inclusive('\n').skip(1) {
        offset += line.len();
        if line.trim_end() == "---" {
            let first_line = after.find('\n').map_or(0, |i| i + 1);
            return after[first_line + offset..].trim_start_matches(['\r', '\n']);
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_five_characters() {
        assert_eq!(esc(r#"<a href="x">Tom & 'Jerry'</a>"#), "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;");
        assert_eq!(esc("plain"), "plain");
    }

    #[test]
    fn url_allow_list() {
        assert_eq!(sanitize_url("https://ok.com/x"), "https://ok.com/x");
        assert_eq!(sanitize_url(" HTTP://ok.com "), "HTTP://ok.com");
        assert_eq!(sanitize_url("/apply"), "/apply");
        assert_eq!(sanitize_url("#form"), "#form");
        assert_eq!(sanitize_url("javascript:alert(1)"), "#");
        assert_eq!(sanitize_url("data:text/html,hi"), "#");
        assert_eq!(sanitize_url("//evil.com"), "#");
        assert_eq!(sanitize_url("ftp://x"), "#");
        assert_eq!(sanitize_url(""), "#");
    }

    #[test]
    fn tracking_id_validation() {
        assert_eq!(valid_gtm_id(" GTM-AB12CD "), Some("GTM-AB12CD"));
        assert_eq!(valid_gtm_id("GTM-ab12"), None);
        assert_eq!(valid_gtm_id("GTM-X');alert(1);//"), None);
        assert_eq!(valid_conversion_id("AW-123456"), Some("AW-123456"));
        assert_eq!(valid_conversion_id("aw-1"), Some("aw-1"));
        assert_eq!(valid_conversion_id("AW-12x"), None);
    }

    #[test]
    fn js_string_cannot_close_script() {
        let lit = js_string("</script><script>alert(1)</script>");
        assert!(!lit.contains("</script>"));
        assert!(lit.starts_with('"') && lit.ends_with('"'));
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0.0), "0");
        assert_eq!(thousands(999.0), "999");
        assert_eq!(thousands(5000.0), "5,000");
        assert_eq!(thousands(1234567.0), "1,234,567");
        assert_eq!(thousands(-2500.0), "-2,500");
        assert_eq!(thousands(1999.5), "1,999.5");
        assert_eq!(thousands(99.125), "99.125");
    }

    #[test]
    fn preview_defaults_for_missing_identity() {
        let site = SiteConfig::default();
        let ctx = RenderContext::new(&site, Mode::Preview);
        assert_eq!(ctx.value(Slot::Brand), "Your Brand");
        assert_eq!(ctx.value(Slot::Domain), "example.com");
        assert_eq!(ctx.value(Slot::H1), "Get Personal Loans up to $5,000");
        assert_eq!(ctx.value(Slot::ApplyUrl), "#apply");
    }

    #[test]
    fn text_slots_are_escaped_and_urls_filtered() {
        let site = SiteConfig {
            brand: "<img src=x onerror=alert(1)>".to_string(),
            redirect_url: "javascript:alert(1)".to_string(),
            ..SiteConfig::default()
        };
        let ctx = RenderContext::new(&site, Mode::Astro);
        let html = render_source(r#"<h1>{{brand}}</h1><a href="{{redirect_url}}">go</a>"#, &ctx);
        assert_eq!(html, r##"<h1>&lt;img src=x onerror=alert(1)&gt;</h1><a href="#">go</a>"##);
    }

    #[test]
    fn sections_follow_mode_and_filled_slots() {
        let mut site = SiteConfig::default();
        let source = "{{#if preview}}P{{else}}A{{/if}}|{{#if badge}}[{{badge}}]{{else}}none{{/if}}|{{#if nope}}x{{/if}}";

        let preview = render_source(source, &RenderContext::new(&site, Mode::Preview));
        assert_eq!(preview, "P|none|");

        site.badge = "Hot".to_string();
        let astro = render_source(source, &RenderContext::new(&site, Mode::Astro));
        assert_eq!(astro, "A|[Hot]|");
    }

    #[test]
    fn unknown_slots_pass_through() {
        let site = SiteConfig::default();
        let out = render_source("a {{unknown_field}} b", &RenderContext::new(&site, Mode::Preview));
        assert_eq!(out, "a {{unknown_field}} b");
    }

    #[test]
    fn flatten_strips_frontmatter_and_directives() {
        let page = "---\nconst x = 1;\n---\n<html><script is:inline>1</script><style is:global>a{}</style></html>";
        assert_eq!(flatten_preview(page), "<html><script>1</script><style>a{}</style></html>");

        let no_fence = "<p>--- not a fence</p>";
        assert_eq!(flatten_preview(no_fence), no_fence);
    }

    #[test]
    fn lang_codes() {
        assert_eq!(lang_code("English"), "en");
        assert_eq!(lang_code("Spanish"), "es");
        assert_eq!(lang_code("Klingon"), "en");
    }
}
