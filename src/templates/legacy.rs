//! Templates kept from before the slot language. Each has hand-written
//! generator functions, one per output type.

use super::module::{APPLY_PAGE, ENTRY_PAGE, apply_page};
use super::render::{Mode, esc, sanitize_url, thousands};
use super::{TemplateInfo, TemplateSource};
use crate::generate::scaffold::scaffold;
use crate::models::design::{self, Palette};
use crate::models::{FileMap, SiteConfig, non_empty};

pub struct LegacyTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub badge: &'static str,
    pub category: &'static str,
    /// Single-file HTML
    pub html: fn(&SiteConfig) -> String,
    /// Astro project
    pub astro: fn(&SiteConfig) -> FileMap,
}

impl std::fmt::Debug for LegacyTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyTemplate").field("id", &self.id).finish()
    }
}

pub static LEGACY_TEMPLATES: &[LegacyTemplate] = &[
    LegacyTemplate {
        id: "astrodeck-loan",
        name: "AstroDeck Loan",
        description: "New AstroDeck-style loan template architecture",
        badge: "New",
        category: "legacy",
        html: astrodeck_html,
        astro: astrodeck_astro,
    },
    LegacyTemplate {
        id: "lander-core",
        name: "PDL Loans V2",
        description: "High-conversion bear-style template with interactive form",
        badge: "Advanced",
        category: "legacy",
        html: lander_core_html,
        astro: lander_core_astro,
    },
];

pub fn find(id: &str) -> Option<&'static LegacyTemplate> {
    LEGACY_TEMPLATES.iter().find(|t| t.id == id)
}

impl LegacyTemplate {
    pub fn info(&self) -> TemplateInfo {
        TemplateInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            badge: self.badge.to_string(),
            category: self.category.to_string(),
            source: TemplateSource::Legacy,
        }
    }
}

struct PageCopy {
    brand: String,
    domain: String,
    loan: &'static str,
    h1: String,
    sub: String,
    badge: String,
    cta: String,
    href: String,
    mid: f64,
}

fn copy(site: &SiteConfig, default_h1: String, default_badge: &str, default_cta: &str) -> PageCopy {
    let href = match non_empty(&site.redirect_url) {
        Some(url) => sanitize_url(url),
        None => "/apply".to_string(),
    };
    PageCopy {
        brand: esc(non_empty(&site.brand).unwrap_or("LoanBridge")),
        domain: esc(non_empty(&site.domain).unwrap_or("example.com")),
        loan: design::loan_label(&site.loan_type),
        h1: esc(non_empty(&site.h1).map_or(default_h1, str::to_string).as_str()),
        sub: esc(non_empty(&site.sub).unwrap_or(
            "Compare lender offers in minutes with no impact to your credit score.",
        )),
        badge: esc(non_empty(&site.badge).unwrap_or(default_badge)),
        cta: esc(non_empty(&site.cta).unwrap_or(default_cta)),
        href: esc(&href),
        mid: site.amount_mid(),
    }
}

/// Wraps static HTML in an Astro page whose frontmatter is a single line
/// comment. Line terminators in the brand would end that comment early.
fn astro_page(html: String, brand: &str) -> String {
    let brand: String = brand
        .chars()
        .map(|c| if c.is_control() || matches!(c, '\u{2028}' | '\u{2029}') { ' ' } else { c })
        .collect();
    format!("---\n// {brand} landing page.\n---\n{html}")
}

fn project(site: &SiteConfig, name: &str, html: String) -> FileMap {
    let mut files = scaffold(site, name);
    let brand = non_empty(&site.brand).unwrap_or("LoanBridge");
    files.insert(ENTRY_PAGE.to_string(), astro_page(html, brand));
    files.insert(APPLY_PAGE.to_string(), apply_page(site, Mode::Astro));
    files
}

pub fn astrodeck_html(site: &SiteConfig) -> String {
    let c = design::color(&site.color_id);
    let f = design::font(&site.font_id);
    let k = copy(
        site,
        format!(
            "Get {} up to ${}",
            design::loan_label(&site.loan_type),
            thousands(site.amount_max)
        ),
        "No Credit Impact",
        "See My Options",
    );
    let hero_top = Palette::css([c.p[0], c.p[1].saturating_sub(25).max(25), 96]);
    let badge_bg = Palette::css([c.p[0], c.p[1], (c.p[2] + 45).min(90)]);
    let badge_fg = Palette::css([c.p[0], c.p[1], c.p[2].saturating_sub(8).max(20)]);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>{brand} | {loan}</title>
<style>
*{{box-sizing:border-box;margin:0;padding:0}}body{{font-family:{family},system-ui,sans-serif;background:{bg};color:{fg}}}
.hero{{padding:56px 20px 26px;background:linear-gradient(180deg,{hero_top},{bg})}}
.container{{max-width:980px;margin:0 auto}}
.badge{{display:inline-flex;background:{badge_bg};color:{badge_fg};padding:6px 12px;border-radius:999px;font-weight:700;font-size:12px;margin-bottom:14px}}
h1{{font-size:clamp(30px,4.2vw,52px);line-height:1.1;letter-spacing:-.02em;max-width:720px}}
.sub{{margin-top:12px;font-size:16px;opacity:.85;max-width:680px}}
.grid{{display:grid;grid-template-columns:1.05fr .95fr;gap:20px;padding:0 20px 28px}}
.card{{background:#fff;border:1px solid rgba(0,0,0,.08);border-radius:16px;box-shadow:0 14px 40px rgba(0,0,0,.08);padding:18px}}
.k{{font-size:12px;color:#6b7280;margin-bottom:6px}}.amt{{font-size:34px;font-weight:800;color:{p};margin-bottom:10px}}
input[type=range]{{width:100%}}.zip{{display:flex;gap:8px;margin-top:10px}}.zip input{{flex:1;border:1px solid #d1d5db;border-radius:12px;padding:12px 14px;font-weight:600}}
.btn{{border:none;border-radius:12px;padding:12px 16px;background:{s};color:#fff;font-weight:800;cursor:pointer;white-space:nowrap;text-decoration:none}}
.trust{{display:grid;grid-template-columns:repeat(3,1fr);gap:10px;margin-top:14px}}.t{{background:#fff;border:1px solid rgba(0,0,0,.07);padding:10px;border-radius:12px;font-size:12px;text-align:center}}
footer{{padding:20px;font-size:11px;color:#6b7280;text-align:center}}
@media(max-width:860px){{.grid{{grid-template-columns:1fr}}}}
</style>
</head>
<body>
  <section class="hero"><div class="container"><div class="badge">{badge}</div><h1>{h1}</h1><p class="sub">{sub}</p></div></section>
  <section class="container grid">
    <div class="card">
      <div class="k">Loan Type</div><div style="font-weight:700;margin-bottom:8px">{loan}</div>
      <div class="k">How it works</div>
      <ol style="padding-left:18px;line-height:1.8;font-size:14px"><li>Choose your amount</li><li>Enter ZIP code</li><li>See your matched options</li></ol>
      <div class="trust"><div class="t">SSL Secured</div><div class="t">2-Min Form</div><div class="t">Soft Pull</div></div>
    </div>
    <div class="card">
      <div class="k">Estimated amount</div><div class="amt">${mid_display}</div>
      <input type="range" min="{min}" max="{max}" value="{mid}" step="100">
      <div class="zip"><input type="text" placeholder="ZIP Code" maxlength="5"><a class="btn" href="{href}">{cta}</a></div>
    </div>
  </section>
  <footer>{brand} &middot; {domain}</footer>
</body>
</html>"#,
        brand = k.brand,
        loan = esc(k.loan),
        family = f.family,
        bg = Palette::css(c.bg),
        fg = Palette::css(c.fg),
        p = Palette::css(c.p),
        s = Palette::css(c.s),
        badge = k.badge,
        h1 = k.h1,
        sub = k.sub,
        mid_display = thousands(k.mid),
        min = site.amount_min,
        max = site.amount_max,
        mid = k.mid,
        href = k.href,
        cta = k.cta,
        domain = k.domain,
    )
}

pub fn astrodeck_astro(site: &SiteConfig) -> FileMap {
    project(site, "AstroDeck Loan", astrodeck_html(site))
}

pub fn lander_core_html(site: &SiteConfig) -> String {
    let c = design::color(&site.color_id);
    let f = design::font(&site.font_id);
    let r = design::radius(&site.radius);
    let k = copy(
        site,
        format!("Fast {} Up To ${}", design::loan_label(&site.loan_type), thousands(site.amount_max)),
        "Trusted by 15,000+ borrowers",
        "Check Your Rate",
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width,initial-scale=1.0">
<title>{brand} – {loan} | Fast Approval</title>
<meta name="description" content="{sub}">
<meta name="theme-color" content="{p}">
<link rel="canonical" href="https://{domain}/">
<style>
:root{{--p:{p};--a:{a};--r:{radius}}}
*{{box-sizing:border-box;margin:0;padding:0}}
body{{font-family:{family},system-ui,sans-serif;background:{bg};color:{fg}}}
.bar{{background:var(--p);color:#fff;text-align:center;padding:8px;font-size:13px;font-weight:600}}
.wrap{{max-width:1080px;margin:0 auto;padding:40px 20px;display:grid;grid-template-columns:1fr 400px;gap:36px}}
h1{{font-size:clamp(28px,4vw,46px);line-height:1.1;margin:10px 0 14px}}
.badge{{color:var(--a);font-weight:800;font-size:13px;text-transform:uppercase;letter-spacing:.05em}}
.steps{{background:#fff;border-radius:var(--r);padding:24px;box-shadow:0 20px 50px rgba(0,0,0,.12)}}
.step{{display:none}}.step.on{{display:block}}
.opts{{display:grid;grid-template-columns:1fr 1fr;gap:10px;margin-top:12px}}
.opt{{border:2px solid #e5e7eb;border-radius:var(--r);padding:14px;text-align:center;font-weight:700;cursor:pointer;background:#fff}}
.opt:hover{{border-color:var(--p)}}
.go{{display:block;margin-top:16px;background:var(--a);color:#fff;text-align:center;padding:14px;border-radius:var(--r);font-weight:800;text-decoration:none}}
.meter{{height:6px;background:#e5e7eb;border-radius:3px;margin-bottom:16px}}.meter i{{display:block;height:100%;width:33%;background:var(--p);border-radius:3px;transition:width .2s}}
footer{{max-width:1080px;margin:0 auto;padding:24px 20px;font-size:12px;opacity:.7}}
@media(max-width:880px){{.wrap{{grid-template-columns:1fr}}}}
</style>
</head>
<body>
<div class="bar">{loan} from ${min_display} to ${max_display}</div>
<main class="wrap">
  <div>
    <div class="badge">{badge}</div>
    <h1>{h1}</h1>
    <p>{sub}</p>
  </div>
  <div class="steps" data-min="{min}" data-max="{max}">
    <div class="meter"><i id="meter"></i></div>
    <div class="step on" data-step="1"><strong>How much do you need?</strong>
      <div class="opts"><button class="opt" data-next="2">${min_display}+</button><button class="opt" data-next="2">${mid_display}+</button><button class="opt" data-next="2">Up to ${max_display}</button><button class="opt" data-next="2">Not sure</button></div>
    </div>
    <div class="step" data-step="2"><strong>What is your credit like?</strong>
      <div class="opts"><button class="opt" data-next="3">Excellent</button><button class="opt" data-next="3">Good</button><button class="opt" data-next="3">Fair</button><button class="opt" data-next="3">Poor</button></div>
    </div>
    <div class="step" data-step="3"><strong>You may qualify.</strong>
      <a class="go" href="{href}">{cta}</a>
    </div>
  </div>
</main>
<footer>{brand} ({domain}) is not a lender. APRs range from {apr_min}% to {apr_max}% and depend on the lender.</footer>
<script>
document.querySelectorAll('.opt').forEach(function(b){{b.addEventListener('click',function(){{
  var n=b.getAttribute('data-next');
  document.querySelectorAll('.step').forEach(function(s){{s.classList.toggle('on',s.getAttribute('data-step')===n);}});
  document.getElementById('meter').style.width=(n*33)+'%';
}});}});
</script>
</body>
</html>"#,
        brand = k.brand,
        loan = esc(k.loan),
        sub = k.sub,
        p = Palette::css(c.p),
        a = Palette::css(c.a),
        bg = Palette::css(c.bg),
        fg = Palette::css(c.fg),
        radius = r.value,
        family = f.family,
        domain = k.domain,
        min = site.amount_min,
        max = site.amount_max,
        min_display = thousands(site.amount_min),
        mid_display = thousands(k.mid),
        max_display = thousands(site.amount_max),
        badge = k.badge,
        h1 = k.h1,
        href = k.href,
        cta = k.cta,
        apr_min = site.apr_min,
        apr_max = site.apr_max,
    )
}

pub fn lander_core_astro(site: &SiteConfig) -> FileMap {
    project(site, "PDL Loans V2", lander_core_html(site))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig {
            brand: "TestBrand".to_string(),
            domain: "testbrand.com".to_string(),
            amount_min: 100.0,
            amount_max: 5000.0,
            cta: "Apply Now".to_string(),
            ..SiteConfig::default()
        }
    }

    #[test]
    fn legacy_html_contains_site_values() {
        for template in LEGACY_TEMPLATES {
            let html = (template.html)(&site());
            for needle in ["TestBrand", "testbrand.com", "100", "5000", "Apply Now"] {
                assert!(html.contains(needle), "{} is missing {needle}", template.id);
            }
        }
    }

    #[test]
    fn legacy_html_escapes_and_filters() {
        let mut s = site();
        s.cta = "<b>go</b>".to_string();
        s.redirect_url = "vbscript:x".to_string();
        for template in LEGACY_TEMPLATES {
            let html = (template.html)(&s);
            assert!(html.contains("&lt;b&gt;go&lt;/b&gt;"), "{}", template.id);
            assert!(html.contains(r##"href="#""##), "{}", template.id);
        }
    }

    #[test]
    fn legacy_projects_wrap_html_in_a_page() {
        for template in LEGACY_TEMPLATES {
            let files = (template.astro)(&site());
            assert!(files[ENTRY_PAGE].starts_with("---\n// TestBrand landing page.\n---\n<!DOCTYPE html>"));
            assert!(files.contains_key(APPLY_PAGE));
            assert!(files.contains_key("package.json"));
        }
    }

    #[test]
    fn brand_line_breaks_stay_inside_the_frontmatter_comment() {
        let mut s = site();
        s.brand = "Acme\rimport fs from 'fs';\u{2028}fs.rmSync('/');\u{2029}x\n;y".to_string();
        for template in LEGACY_TEMPLATES {
            let files = (template.astro)(&s);
            let page = &files[ENTRY_PAGE];
            let frontmatter = page.split("---").nth(1).unwrap();
            assert_eq!(frontmatter.lines().filter(|l| !l.is_empty()).count(), 1, "{}", template.id);
            assert!(!frontmatter.contains(['\r', '\u{2028}', '\u{2029}']), "{}", template.id);
            assert!(frontmatter.trim_start().starts_with("// Acme import fs"), "{}", template.id);
        }
    }

    #[test]
    fn extreme_amounts_render() {
        let mut s = site();
        s.amount_min = i64::MAX as f64 - 10.0;
        s.amount_max = i64::MAX as f64;
        for template in LEGACY_TEMPLATES {
            let html = (template.html)(&s);
            assert!(!html.contains("-9,"), "{} rendered a wrapped amount", template.id);
            assert!(html.contains("9,223,372,036,854,775,808"), "{}", template.id);
        }
    }
}
