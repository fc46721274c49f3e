//! Generated snippets behind the `Markup` slots. Every user value is
//! validated or escaped here, so templates can insert the result as-is.

use serde_json::json;

use super::render::{esc, js_string, sanitize_url, script_safe, thousands, valid_conversion_id, valid_gtm_id};
use crate::models::{SiteConfig, non_empty};

const LEAD_FORM_SCRIPT: &str = "https://apikeep.com/form/applicationInit.js";

pub fn robots_meta(site: &SiteConfig) -> String {
    if site.noindex {
        r#"<meta name="robots" content="noindex,nofollow">"#.to_string()
    } else {
        String::new()
    }
}

pub fn gtm_head(site: &SiteConfig) -> String {
    let Some(id) = valid_gtm_id(&site.gtm_id) else {
        return String::new();
    };
    format!(
        "<script is:inline>(function(w,d,s,l,i){{w[l]=w[l]||[];w[l].push({{'gtm.start':new Date().getTime(),event:'gtm.js'}});\
var f=d.getElementsByTagName(s)[0],j=d.createElement(s),dl=l!='dataLayer'?'&l='+l:'';j.async=true;\
j.src='https://www.googletagmanager.com/gtm.js?id='+i+dl;f.parentNode.insertBefore(j,f);}})(window,document,'script','dataLayer','{id}');</script>"
    )
}

pub fn gtm_body(site: &SiteConfig) -> String {
    let Some(id) = valid_gtm_id(&site.gtm_id) else {
        return String::new();
    };
    format!(
        r#"<noscript><iframe src="https://www.googletagmanager.com/ns.html?id={id}" height="0" width="0" style="display:none;visibility:hidden"></iframe></noscript>"#
    )
}

/// gtag.js for Google Ads conversions, or a marker comment when no valid id
/// is configured.
pub fn ads_tag(site: &SiteConfig) -> String {
    match valid_conversion_id(&site.conversion_id) {
        Some(id) => format!(
            "<script async src=\"https://www.googletagmanager.com/gtag/js?id={id}\"></script>\
<script is:inline>window.dataLayer=window.dataLayer||[];function gtag(){{dataLayer.push(arguments);}}gtag('js',new Date());gtag('config','{id}');</script>"
        ),
        None => "<!-- No Google Ads conversion ID configured -->".to_string(),
    }
}

pub fn voluum_tag(site: &SiteConfig) -> String {
    let Some(id) = non_empty(&site.voluum_id) else {
        return String::new();
    };
    let host = match non_empty(&site.voluum_domain) {
        Some(domain) => domain.trim_start_matches("https://").trim_start_matches("http://").to_string(),
        None => format!("{id}.trck.pch"),
    };
    format!(
        r#"<script async src="https://{}/webp/e.js?v={}"></script>"#,
        esc(&host),
        esc(&urlencoding::encode(id))
    )
}

/// Tracking settings as a JSON object literal for inline scripts.
pub fn tracking_json(site: &SiteConfig) -> String {
    let value = json!({
        "aid": site.aid.trim(),
        "network": site.network.trim(),
        "conversionId": valid_conversion_id(&site.conversion_id).unwrap_or(""),
        "formStartLabel": non_empty(&site.form_start_label).unwrap_or("Form Start"),
        "formSubmitLabel": non_empty(&site.form_submit_label).unwrap_or("Form Submit"),
        "redirectUrl": sanitize_url(&site.redirect_url),
        "voluumId": site.voluum_id.trim(),
    });
    script_safe(&value.to_string())
}

const BADGES: &[(&str, &str, &str)] = &[
    ("lock", "256-bit SSL", "Bank-level encryption protects your data"),
    ("shield", "No Credit Impact", "Checking offers will not affect your score"),
    ("bolt", "Fast Decisions", "Most requests reviewed in minutes"),
    ("check", "Trusted Lenders", "Licensed partners across the US"),
];

fn badge_icon(name: &str, tone: &str) -> String {
    let path = match name {
        "lock" => "M6 10V7a6 6 0 1 1 12 0v3h1v11H5V10zm2 0h8V7a4 4 0 1 0-8 0z",
        "shield" => "M12 2l8 3v6c0 5-3.4 9.4-8 11-4.6-1.6-8-6-8-11V5z",
        "bolt" => "M13 2L4 14h7l-1 8 9-12h-7z",
        _ => "M9 16.2l-3.5-3.5L4 14.2l5 5 11-11-1.5-1.5z",
    };
    format!(r#"<svg viewBox="0 0 24 24" width="20" height="20" fill="{tone}" aria-hidden="true"><path d="{path}"/></svg>"#)
}

/// Trust badges in the site's style: `compact` row, `cards` grid, or both.
pub fn trust_badges(site: &SiteConfig, tone: &str) -> String {
    let style = site.trust_badge_style.as_str();
    let mut out = String::new();

    if style != "cards" {
        out.push_str(r#"<ul class="trust-row">"#);
        for (icon, title, _) in BADGES {
            out.push_str(&format!("<li>{}<span>{title}</span></li>", badge_icon(icon, tone)));
        }
        out.push_str("</ul>");
    }
    if style == "cards" || style == "both" || style.is_empty() {
        out.push_str(r#"<div class="trust-cards">"#);
        for (icon, title, detail) in BADGES {
            out.push_str(&format!(
                r#"<div class="trust-card">{}<strong>{title}</strong><p>{detail}</p></div>"#,
                badge_icon(icon, tone)
            ));
        }
        out.push_str("</div>");
    }
    out
}

/// FAQ built from the loan parameters.
pub fn faq(site: &SiteConfig) -> String {
    let brand = esc(non_empty(&site.brand).unwrap_or("We"));
    let email = match non_empty(&site.email) {
        Some(email) => esc(email),
        None => format!("support@{}", esc(non_empty(&site.domain).unwrap_or("example.com"))),
    };
    let entries = [
        (
            "How much can I request?".to_string(),
            format!(
                "Requests range from ${} to ${} depending on your state and the lender.",
                thousands(site.amount_min),
                thousands(site.amount_max)
            ),
        ),
        (
            "What rates should I expect?".to_string(),
            format!(
                "APRs offered by lenders in our network range from {}% to {}%.",
                site.apr_min, site.apr_max
            ),
        ),
        (
            "Will this affect my credit score?".to_string(),
            "No. Checking your options uses a soft inquiry that does not affect your credit score."
                .to_string(),
        ),
        (
            format!("Is {brand} a lender?"),
            format!("No. {brand} connects you with lenders; questions can be sent to {email}."),
        ),
    ];

    let mut out = String::from(r#"<div class="faq">"#);
    for (question, answer) in entries {
        out.push_str(&format!("<details><summary>{question}</summary><p>{answer}</p></details>"));
    }
    out.push_str("</div>");
    out
}

/// Lead form for the apply page. Priority: affiliate id (hosted lead form) >
/// raw form embed > redirect to the sanitised redirect URL > a placeholder.
pub fn lead_form(site: &SiteConfig) -> String {
    if let Some(aid) = non_empty(&site.aid) {
        let conversion = valid_conversion_id(&site.conversion_id);
        let conversion_call = |label: &str| match conversion {
            Some(id) => format!(
                "if(window.gtag)gtag('event','conversion',{{send_to:{}}});",
                js_string(&format!("{id}/{label}"))
            ),
            None => String::new(),
        };
        let start = conversion_call(site.form_start_label.trim());
        let submit = conversion_call(site.form_submit_label.trim());
        return format!(
            r#"<script is:inline>
var clickid=new URLSearchParams(window.location.search).get('clickid')||'';
var formStartFired=sessionStorage.getItem('_fs')==='1';
var _lg_form_init_={{
  aid:{aid},
  template:"fresh",
  click_id:clickid,
  onFormLoad:function(){{
    if(!formStartFired){{formStartFired=true;sessionStorage.setItem('_fs','1');{start}}}
    if(window.__pixel)__pixel('fl');
  }},
  onStepChange:function(step){{if(window.__pixel)__pixel('step',{{step:step}});}},
  onSubmit:function(){{
    {submit}
    if(window.__pixel)__pixel('fs',{{clickid:clickid}});
  }},
  onSuccess:function(response){{
    if(window.__pixel)__pixel('success',{{clickid:clickid,lead_id:response&&response.lead_id||''}});
  }}
}};
</script>
<script type="text/javascript" async="true" src="{LEAD_FORM_SCRIPT}"></script>
<div id="_lg_form_"></div>"#,
            aid = js_string(aid),
        );
    }

    if let Some(embed) = non_empty(&site.form_embed) {
        let lower = embed.to_ascii_lowercase();
        let has_tag = ["<script", "<div", "<iframe", "<form", "<link"]
            .iter()
            .any(|tag| lower.contains(tag));
        return if has_tag {
            embed.to_string()
        } else {
            format!("<script>{embed}</script>")
        };
    }

    if let Some(url) = non_empty(&site.redirect_url) {
        return format!(
            "<script is:inline>window.location.href={};</script>",
            js_string(&sanitize_url(url))
        );
    }

    r#"<p style="text-align:center;padding:40px;color:#999">No form configured.</p>"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gtm_snippets_require_valid_id() {
        let mut site = SiteConfig::default();
        site.gtm_id = "GTM-'</script>".to_string();
        assert!(gtm_head(&site).is_empty());
        assert!(gtm_body(&site).is_empty());

        site.gtm_id = "GTM-K9X2".to_string();
        assert!(gtm_head(&site).contains("'GTM-K9X2'"));
        assert!(gtm_body(&site).contains("id=GTM-K9X2"));
    }

    #[test]
    fn ads_tag_marks_missing_id() {
        let mut site = SiteConfig::default();
        assert!(ads_tag(&site).starts_with("<!--"));
        site.conversion_id = "AW-1234".to_string();
        assert!(ads_tag(&site).contains("gtag('config','AW-1234')"));
    }

    #[test]
    fn lead_form_priority() {
        let mut site = SiteConfig {
            aid: "14881".to_string(),
            form_embed: "<div id=\"embed\"></div>".to_string(),
            redirect_url: "https://offers.example.com".to_string(),
            ..SiteConfig::default()
        };
        assert!(lead_form(&site).contains("aid:\"14881\""));

        site.aid.clear();
        assert_eq!(lead_form(&site), "<div id=\"embed\"></div>");

        site.form_embed.clear();
        assert!(lead_form(&site).contains("window.location.href=\"https://offers.example.com\""));

        site.redirect_url = "javascript:alert(1)".to_string();
        assert!(lead_form(&site).contains("window.location.href=\"#\""));

        site.redirect_url.clear();
        assert!(lead_form(&site).contains("No form configured"));
    }

    #[test]
    fn bare_embed_script_is_wrapped() {
        let site = SiteConfig {
            aid: String::new(),
            form_embed: "loadForm()".to_string(),
            ..SiteConfig::default()
        };
        assert_eq!(lead_form(&site), "<script>loadForm()</script>");
    }

    #[test]
    fn tracking_json_is_script_safe() {
        let site = SiteConfig {
            network: "</script><b>".to_string(),
            conversion_id: "bogus".to_string(),
            ..SiteConfig::default()
        };
        let json = tracking_json(&site);
        assert!(!json.contains('<'));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["network"], "</script><b>");
        assert_eq!(parsed["conversionId"], "");
        assert_eq!(parsed["redirectUrl"], "#");
    }

    #[test]
    fn trust_badge_styles() {
        let mut site = SiteConfig::default();
        site.trust_badge_style = "compact".to_string();
        let compact = trust_badges(&site, "red");
        assert!(compact.contains("trust-row") && !compact.contains("trust-cards"));

        site.trust_badge_style = "cards".to_string();
        let cards = trust_badges(&site, "red");
        assert!(!cards.contains("trust-row") && cards.contains("trust-cards"));

        site.trust_badge_style = "both".to_string();
        let both = trust_badges(&site, "red");
        assert!(both.contains("trust-row") && both.contains("trust-cards"));
        assert!(both.contains("fill=\"red\""));
    }

    #[test]
    fn faq_escapes_brand() {
        let site = SiteConfig {
            brand: "A&B".to_string(),
            ..SiteConfig::default()
        };
        let html = faq(&site);
        assert!(html.contains("Is A&amp;B a lender?"));
        assert!(html.contains("$100 to $5,000"));
    }
}
