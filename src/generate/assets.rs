//! Favicon and social preview images, drawn as SVG from the site's palette.

use chrono::Utc;

use crate::models::design::{self, Palette};
use crate::models::{SiteConfig, non_empty};
use crate::templates::render::esc;

/// Brand initial on a palette gradient, 64x64.
pub fn favicon_svg(site: &SiteConfig) -> String {
    let c = design::color(&site.color_id);
    let initial = site
        .brand
        .trim()
        .chars()
        .next()
        .map_or_else(|| "L".to_string(), |ch| ch.to_uppercase().collect());

    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 64 64">
  <defs>
    <linearGradient id="g" x1="0" y1="0" x2="1" y2="1">
      <stop offset="0%" stop-color="{p}"/>
      <stop offset="100%" stop-color="{a}"/>
    </linearGradient>
  </defs>
  <rect width="64" height="64" rx="14" fill="url(#g)"/>
  <text x="32" y="44" text-anchor="middle" font-family="system-ui,-apple-system,sans-serif" font-size="36" font-weight="800" fill="#fff">{initial}</text>
</svg>"##,
        p = Palette::css(c.p),
        a = Palette::css(c.a),
        initial = esc(&initial),
    )
}

/// 1200x630 card with brand, loan product and tagline.
pub fn og_image_svg(site: &SiteConfig) -> String {
    let c = design::color(&site.color_id);
    let brand = non_empty(&site.brand).unwrap_or("LoanBridge");
    let tagline = non_empty(&site.sub)
        .or_else(|| non_empty(&site.tagline))
        .unwrap_or("Fast, Simple, Trusted.");
    let dark_p = [c.p[0], (c.p[1] + 10).min(100), c.p[2].saturating_sub(30).max(5)];
    let dark_a = [c.a[0], (c.a[1] + 10).min(100), c.a[2].saturating_sub(25).max(8)];

    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="1200" height="630" viewBox="0 0 1200 630">
  <defs>
    <linearGradient id="bg" x1="0" y1="0" x2="1" y2="1">
      <stop offset="0%" stop-color="{from}"/>
      <stop offset="100%" stop-color="{to}"/>
    </linearGradient>
  </defs>
  <rect width="1200" height="630" fill="url(#bg)"/>
  <circle cx="1050" cy="100" r="200" fill="#fff" opacity="0.08"/>
  <circle cx="100" cy="550" r="150" fill="#fff" opacity="0.08"/>
  <rect x="80" y="180" width="72" height="72" rx="16" fill="#fff" fill-opacity="0.15"/>
  <text x="116" y="230" text-anchor="middle" font-family="system-ui,sans-serif" font-size="40" font-weight="700" fill="#fff">{initial}</text>
  <text x="176" y="232" font-family="system-ui,sans-serif" font-size="44" font-weight="800" fill="#fff">{brand}</text>
  <text x="80" y="340" font-family="system-ui,sans-serif" font-size="56" font-weight="800" fill="#fff">{loan}</text>
  <text x="80" y="410" font-family="system-ui,sans-serif" font-size="28" fill="#fff" fill-opacity="0.85">{tagline}</text>
  <text x="80" y="560" font-family="system-ui,sans-serif" font-size="22" fill="#fff" fill-opacity="0.6">{domain}</text>
</svg>"##,
        from = Palette::css(dark_p),
        to = Palette::css(dark_a),
        initial = esc(&brand.chars().next().map(|ch| ch.to_uppercase().collect::<String>()).unwrap_or_default()),
        brand = esc(brand),
        loan = esc(design::loan_label(&site.loan_type)),
        tagline = esc(tagline),
        domain = esc(non_empty(&site.domain).unwrap_or("example.com")),
    )
}

pub fn svg_data_url(svg: &str) -> String {
    format!("data:image/svg+xml,{}", urlencoding::encode(svg))
}

impl SiteConfig {
    /// Regenerates the favicon and OG image data URLs after a design change.
    pub fn touch_assets(&mut self) {
        self.favicon_data_url = svg_data_url(&favicon_svg(self));
        self.og_image_data_url = svg_data_url(&og_image_svg(self));
        self.updated_at = Some(Utc::now());
    }
}
