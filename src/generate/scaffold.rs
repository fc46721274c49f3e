//! Project files shared by every built-in template: build config, env,
//! favicon, theme export and README.

use serde_json::json;

use super::assets;
use super::theme::theme_json;
use crate::models::design;
use crate::models::{FileMap, SiteConfig, non_empty};

const ASTRO_VERSION: &str = "^5.2.0";

pub fn package_name(site: &SiteConfig) -> String {
    let brand = non_empty(&site.brand).unwrap_or("lp");
    let mut name: String = brand
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    name.push_str("-lp");
    name
}

pub fn package_json(site: &SiteConfig) -> String {
    let value = json!({
        "name": package_name(site),
        "private": true,
        "version": "1.0.0",
        "type": "module",
        "scripts": {
            "dev": "astro dev",
            "build": "astro build",
            "preview": "astro preview"
        },
        "dependencies": {
            "astro": ASTRO_VERSION,
            "@astrojs/sitemap": "^3.2.0"
        },
        "devDependencies": {
            "typescript": "^5.7.0"
        }
    });
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

pub fn astro_config(site: &SiteConfig) -> String {
    let domain: String = non_empty(&site.domain)
        .unwrap_or("example.com")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    format!(
        r#"import {{ defineConfig }} from 'astro/config';
import sitemap from '@astrojs/sitemap';

export default defineConfig({{
  output: 'static',
  site: process.env.SITE_URL || 'https://{domain}',
  build: {{
    assets: '_assets',
    inlineStylesheets: 'always',
  }},
  integrations: [sitemap()],
}});
"#
    )
}

pub fn tsconfig() -> String {
    let value = json!({
        "extends": "astro/tsconfigs/strict",
        "compilerOptions": { "baseUrl": ".", "paths": { "@/*": ["src/*"] } }
    });
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

/// `.env` values are single-line; anything after a newline is dropped.
fn env_value(value: &str) -> &str {
    value.trim().lines().next().unwrap_or("")
}

pub fn env_file(site: &SiteConfig) -> String {
    let domain = non_empty(&site.domain).unwrap_or("example.com");
    let brand = non_empty(&site.brand).unwrap_or("Your Brand");
    let rows = [
        ("SITE_URL", format!("https://{}", env_value(domain))),
        ("PUBLIC_SITE_NAME", env_value(brand).to_string()),
        ("PUBLIC_COMPANY_NAME", env_value(brand).to_string()),
        ("PUBLIC_CONVERSION_ID", env_value(&site.conversion_id).to_string()),
        ("PUBLIC_FORM_START_LABEL", env_value(&site.form_start_label).to_string()),
        ("PUBLIC_FORM_SUBMIT_LABEL", env_value(&site.form_submit_label).to_string()),
        ("PUBLIC_GTM_ID", env_value(&site.gtm_id).to_string()),
        ("PUBLIC_AID", env_value(&site.aid).to_string()),
        ("PUBLIC_NETWORK", env_value(&site.network).to_string()),
        ("PUBLIC_VOLUUM_ID", env_value(&site.voluum_id).to_string()),
        ("PUBLIC_VOLUUM_DOMAIN", env_value(&site.voluum_domain).to_string()),
    ];
    rows.iter().map(|(key, value)| format!("{key}={value}\n")).collect()
}

pub fn readme(site: &SiteConfig, template_name: &str) -> String {
    let brand = non_empty(&site.brand).unwrap_or("Your Brand");
    let domain = non_empty(&site.domain).unwrap_or("example.com");
    format!(
        r#"# {brand} Landing Page

Astro static landing page for {loan} ({template_name} template).

## Quick Start

```bash
npm install
npm run dev      # Dev server at localhost:4321
npm run build    # Build to dist/
npm run preview  # Preview built site
```

## Configuration

Tracking ids live in `.env`; colors, fonts and copy in `theme.json`.
The production URL is https://{domain}.

## Deploy

```bash
# Cloudflare Pages
npx wrangler pages deploy dist/

# Netlify
npx netlify deploy --prod --dir=dist
```
"#,
        loan = design::loan_label(&site.loan_type),
    )
}

/// Every file a built-in template shares, without the pages.
pub fn scaffold(site: &SiteConfig, template_name: &str) -> FileMap {
    let mut files = FileMap::new();
    files.insert("package.json".to_string(), package_json(site));
    files.insert("astro.config.mjs".to_string(), astro_config(site));
    files.insert("tsconfig.json".to_string(), tsconfig());
    files.insert(".env".to_string(), env_file(site));
    files.insert("public/favicon.svg".to_string(), assets::favicon_svg(site));
    files.insert(
        "theme.json".to_string(),
        serde_json::to_string_pretty(&theme_json(site)).unwrap_or_default(),
    );
    files.insert("README.md".to_string(), readme(site, template_name));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_json_is_valid_and_named_after_brand() {
        let site = SiteConfig::new("Test Brand!", "testbrand.com");
        let parsed: serde_json::Value = serde_json::from_str(&package_json(&site)).unwrap();
        assert_eq!(parsed["name"], "test-brand--lp");
        assert_eq!(parsed["dependencies"]["astro"], ASTRO_VERSION);
    }

    #[test]
    fn env_file_cannot_be_split_by_newlines() {
        let site = SiteConfig {
            aid: "123\nEVIL=1".to_string(),
            domain: "x.com".to_string(),
            ..SiteConfig::default()
        };
        let env = env_file(&site);
        assert!(env.contains("PUBLIC_AID=123\n"));
        assert!(!env.contains("EVIL"));
        assert!(env.starts_with("SITE_URL=https://x.com\n"));
    }

    #[test]
    fn scaffold_has_build_files() {
        let files = scaffold(&SiteConfig::new("Acme", "acme.com"), "Classic LP");
        for path in ["package.json", "astro.config.mjs", "tsconfig.json", ".env", "public/favicon.svg", "theme.json", "README.md"] {
            assert!(files.contains_key(path), "missing {path}");
        }
        assert!(files["astro.config.mjs"].contains("'https://acme.com'"));
    }
}
