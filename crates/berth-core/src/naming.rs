//! Name derivations for instances
//!
//! Every derived identifier (directory name, database name, routing slug, CI
//! names) is a pure function of the instance name. Callers recompute them
//! explicitly after changing a name.

use once_cell::sync::Lazy;
use rand::distributions::{Alphanumeric, DistString};
use regex::Regex;

use crate::constants::{CI_NAME_SUFFIX, FALLBACK_SLUG};

static NON_WORD_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z_]+").expect("Invalid non-word regex"));

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z_]").expect("Invalid non-word regex"));

static NON_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z-]").expect("Invalid slug regex"));

static NON_REPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z\-_]").expect("Invalid repository regex"));

static HYPHEN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("Invalid hyphen regex"));

/// Directory name used for the instance root
pub fn safe_dir_name(name: &str) -> String {
    NON_WORD_RUN.replace_all(name, "_").to_lowercase()
}

/// Database identifier: lowercase word characters, never empty, never digit-leading
pub fn db_identifier(name: &str) -> String {
    let replaced = NON_WORD.replace_all(name, "_").to_lowercase();
    let safe = replaced.trim_matches('_');

    let digit_leading = safe.chars().next().map_or(false, |c| c.is_ascii_digit());
    if safe.is_empty() {
        "odoo_instance".to_string()
    } else if digit_leading {
        format!("odoo_{}", safe)
    } else {
        safe.to_string()
    }
}

/// URL-safe slug used for public hosts and router names
pub fn instance_slug(name: &str) -> String {
    let replaced = NON_SLUG.replace_all(name, "-").to_lowercase();
    let collapsed = HYPHEN_RUN.replace_all(&replaced, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Router name for the reverse proxy labels
pub fn router_name(slug: &str) -> String {
    slug.replace(['.', '_'], "-")
}

/// Repository name for the instance's custom addons
pub fn repository_name(name: &str) -> String {
    let replaced = NON_REPO.replace_all(name, "-");
    let collapsed = HYPHEN_RUN.replace_all(&replaced, "-");
    let base = collapsed.trim_matches('-');
    let base = if base.is_empty() { FALLBACK_SLUG } else { base };
    format!("{}-{}", base, CI_NAME_SUFFIX)
}

/// Build job name for the instance
pub fn build_job_name(name: &str) -> String {
    format!("{}-{}", instance_slug(name), CI_NAME_SUFFIX)
}

/// Public host composed from the slug and the routing base domain
pub fn public_host(name: &str, base_domain: &str) -> String {
    format!("{}.{}", instance_slug(name), base_domain)
}

/// Random alphanumeric secret
pub fn generate_secret(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}
