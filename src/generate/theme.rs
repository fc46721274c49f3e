use serde_json::{Value, json};

use crate::models::{SiteConfig, amount_value};
use crate::models::design::{self, Palette};

/// Design tokens, copy and tracking of a site in the `theme.json` shape the
/// Astro projects read.
pub fn theme_json(site: &SiteConfig) -> Value {
    let c = design::color(&site.color_id);
    let f = design::font(&site.font_id);
    let r = design::radius(&site.radius);
    let muted = [c.bg[0], c.bg[1], c.bg[2].saturating_sub(2).max(90)];

    json!({
        "variantId": site.id,
        "domain": site.domain,
        "colors": {
            "primary": Palette::channels(c.p),
            "secondary": Palette::channels(c.s),
            "accent": Palette::channels(c.a),
            "background": Palette::channels(c.bg),
            "foreground": Palette::channels(c.fg),
            "card": "0 0% 100%",
            "card-foreground": Palette::channels(c.fg),
            "muted": Palette::channels(muted),
            "muted-foreground": "215 16% 47%",
            "border": "214 32% 91%",
            "input": "214 32% 91%",
            "ring": Palette::channels(c.p),
            "primary-foreground": "0 0% 100%",
            "secondary-foreground": "0 0% 100%",
            "accent-foreground": "0 0% 100%"
        },
        "radius": r.value,
        "font": { "id": f.id, "family": f.family, "googleImport": f.import },
        "layout": { "hero": design::layout(&site.layout).hero },
        "copy": {
            "brand": site.brand,
            "tagline": site.tagline,
            "h1": site.h1,
            "h1span": "",
            "badge": site.badge,
            "cta": site.cta,
            "sub": site.sub,
            "complianceEmail": site.email
        },
        "loanProduct": {
            "type": site.loan_type,
            "amountMin": amount_value(site.amount_min),
            "amountMax": amount_value(site.amount_max),
            "aprMin": site.apr_min,
            "aprMax": site.apr_max
        },
        "tracking": {
            "conversionId": site.conversion_id,
            "formStartLabel": site.form_start_label,
            "formSubmitLabel": site.form_submit_label,
            "gtmId": site.gtm_id,
            "aid": site.aid,
            "network": site.network,
            "redirectUrl": site.redirect_url,
            "voluumId": site.voluum_id,
            "voluumDomain": site.voluum_domain
        }
    })
}
