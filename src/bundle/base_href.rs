//! Rewrites references in emitted documents so the output tree can be served from any base path.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::asset_paths::should_ignore_asset_reference;
use crate::error::ConfigError;
use crate::models::{BuildManifest, DocumentKind, EmittedDocument};

/// Relative base every emitted reference is rewritten against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseHref {
  href: String,
  public_origin: Option<String>,
}

impl Default for BaseHref {
  fn default() -> Self {
    Self {
      href: "./".into(),
      public_origin: None,
    }
  }
}

impl BaseHref {
  /// Validate a relative base href and the optional origin the app would otherwise be served from.
  ///
  /// References to `public_origin` (for example `https://app.example.com/assets/x.js`) are treated
  /// like root-absolute references and relocated as well.
  pub fn parse(href: &str, public_origin: Option<&str>) -> Result<Self, ConfigError> {
    let trimmed = href.trim();
    if trimmed.starts_with('/') || scheme_pattern().is_match(trimmed) {
      return Err(ConfigError::Invalid {
        field: "base_href",
        reason: format!("`{trimmed}` must be a relative path such as `./`"),
      });
    }

    let href = match trimmed {
      "" | "." => "./".to_string(),
      value if value.ends_with('/') => value.to_string(),
      value => format!("{value}/"),
    };

    let public_origin = match public_origin.map(str::trim) {
      None | Some("") => None,
      Some(origin) => {
        let lower = origin.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
          return Err(ConfigError::Invalid {
            field: "public_origin",
            reason: format!("`{origin}` must start with http:// or https://"),
          });
        }
        Some(origin.trim_end_matches('/').to_string())
      }
    };

    Ok(Self {
      href,
      public_origin,
    })
  }

  /// Normalised base href, always ending with `/`.
  pub fn as_str(&self) -> &str {
    &self.href
  }

  /// Rewrite `reference` for a document `depth` directories below the output root.
  ///
  /// Returns `None` when the reference is already relative, points at another host, or is not
  /// a file reference at all.
  pub fn relocate(&self, reference: &str, depth: usize) -> Option<String> {
    let trimmed = reference.trim();
    if should_ignore_asset_reference(trimmed) {
      return None;
    }
    let path = self.root_relative(trimmed)?;
    Some(format!("{}{}", self.prefix_for(depth), path))
  }

  fn root_relative<'r>(&self, reference: &'r str) -> Option<&'r str> {
    if let Some(origin) = &self.public_origin {
      let host = origin.split_once("://").map_or(origin.as_str(), |(_, host)| host);
      let rest = strip_prefix_ignore_case(reference, origin)
        .or_else(|| strip_prefix_ignore_case(reference.strip_prefix("//")?, host));
      if let Some(rest) = rest {
        if rest.is_empty() || rest.starts_with(['/', '?', '#']) {
          return Some(rest.trim_start_matches('/'));
        }
      }
    }

    if reference.starts_with("//") || scheme_pattern().is_match(reference) {
      return None;
    }

    reference
      .strip_prefix('/')
      .map(|rest| rest.trim_start_matches('/'))
  }

  fn prefix_for(&self, depth: usize) -> String {
    if depth == 0 {
      return self.href.clone();
    }
    let ups = "../".repeat(depth);
    match self.href.strip_prefix("./") {
      Some(rest) => format!("{ups}{rest}"),
      None => format!("{ups}{}", self.href),
    }
  }
}

/// Rewrite every relocatable reference in the manifest's documents against `base`.
///
/// Only the in-memory documents change; writing them out is the bundler's emission step.
pub fn apply_base(mut manifest: BuildManifest, base: &BaseHref) -> BuildManifest {
  let known_paths: BTreeSet<String> = manifest.emitted_paths().into_iter().collect();
  let documents = std::mem::take(&mut manifest.documents);

  manifest.documents = documents
    .into_iter()
    .map(|mut document| {
      let (contents, rewritten) = rewrite_document(&document, base, &known_paths);
      if rewritten > 0 {
        tracing::debug!(
          document = %document.file_name,
          rewritten,
          "relocated document references"
        );
      }
      document.contents = contents;
      document
    })
    .collect();
  manifest.base_href = base.as_str().to_string();
  manifest
}

fn rewrite_document(
  document: &EmittedDocument,
  base: &BaseHref,
  known_paths: &BTreeSet<String>,
) -> (String, usize) {
  let depth = document.depth();
  let mut rewritten = 0usize;
  let contents = match document.kind {
    DocumentKind::Html => {
      let text = rewrite_html_attributes(&document.contents, base, depth, &mut rewritten);
      rewrite_css_references(&text, base, depth, &mut rewritten)
    }
    DocumentKind::Css => rewrite_css_references(&document.contents, base, depth, &mut rewritten),
    DocumentKind::Script => rewrite_script_literals(
      &document.contents,
      &document.file_name,
      base,
      known_paths,
      &mut rewritten,
    ),
  };
  (contents, rewritten)
}

fn rewrite_html_attributes(text: &str, base: &BaseHref, depth: usize, count: &mut usize) -> String {
  attribute_pattern()
    .replace_all(text, |caps: &Captures| {
      let attr = &caps["attr"];
      let (quote, value) = quoted_value(caps);
      let relocated = if attr.eq_ignore_ascii_case("srcset") {
        relocate_srcset(value, base, depth)
      } else {
        base.relocate(value, depth)
      };
      match relocated {
        Some(new_value) => {
          *count += 1;
          format!(
            "{}{}{}{quote}{new_value}{quote}",
            &caps["lead"], attr, &caps["eq"]
          )
        }
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}

fn rewrite_css_references(text: &str, base: &BaseHref, depth: usize, count: &mut usize) -> String {
  let text = css_url_pattern()
    .replace_all(text, |caps: &Captures| {
      let (quote, value) = match caps.name("bare") {
        Some(bare) => ("", bare.as_str()),
        None => quoted_value(caps),
      };
      match base.relocate(value, depth) {
        Some(new_value) => {
          *count += 1;
          format!("url({quote}{new_value}{quote})")
        }
        None => caps[0].to_string(),
      }
    })
    .into_owned();

  css_import_pattern()
    .replace_all(&text, |caps: &Captures| {
      let (quote, value) = quoted_value(caps);
      match base.relocate(value, depth) {
        Some(new_value) => {
          *count += 1;
          format!("@import {quote}{new_value}{quote}")
        }
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}

/// Script string literals are rewritten only when they name a file this build emitted or staged.
///
/// Specifiers naming another script resolve against the importing module, so they become
/// relative to the script's own directory. Anything else (scene files, images, fetch targets)
/// resolves against the page at the output root.
fn rewrite_script_literals(
  text: &str,
  script_file: &str,
  base: &BaseHref,
  known_paths: &BTreeSet<String>,
  count: &mut usize,
) -> String {
  script_literal_pattern()
    .replace_all(text, |caps: &Captures| {
      let open = &caps["open"];
      let close = &caps["close"];
      let path = &caps["path"];
      let split = path.find(['?', '#']).unwrap_or(path.len());
      let (file, suffix) = path.split_at(split);
      if open != close || !known_paths.contains(file) {
        return caps[0].to_string();
      }

      let relocated = if DocumentKind::from_path(Path::new(file)) == Some(DocumentKind::Script) {
        Some(format!("{}{suffix}", module_relative(script_file, file)))
      } else {
        base.relocate(&format!("/{path}"), 0)
      };
      match relocated {
        Some(new_value) => {
          *count += 1;
          format!("{open}{new_value}{close}")
        }
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}

/// Path from the directory of `from_file` to `target`, both relative to the output root.
fn module_relative(from_file: &str, target: &str) -> String {
  let segments = |value: &str| -> Vec<String> {
    value
      .replace('\\', "/")
      .split('/')
      .filter(|segment| !segment.is_empty() && *segment != ".")
      .map(str::to_string)
      .collect()
  };
  let from = segments(from_file);
  let to = segments(target);
  let from_dir = &from[..from.len().saturating_sub(1)];

  let shared = from_dir
    .iter()
    .zip(&to)
    .take_while(|(a, b)| a == b)
    .count()
    .min(to.len().saturating_sub(1));
  let rest = to[shared..].join("/");
  match from_dir.len() - shared {
    0 => format!("./{rest}"),
    ups => format!("{}{rest}", "../".repeat(ups)),
  }
}

/// Candidate URLs run up to the next whitespace, so commas inside them (data URLs) are kept.
fn relocate_srcset(value: &str, base: &BaseHref, depth: usize) -> Option<String> {
  let mut changed = false;
  let mut candidates: Vec<String> = Vec::new();
  let mut rest = value;

  loop {
    rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    if rest.is_empty() {
      break;
    }

    let url_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let (token, after) = rest.split_at(url_end);
    let (url, descriptor) = match token.strip_suffix(',') {
      Some(url) => {
        rest = after;
        (url, "")
      }
      None => {
        let descriptor_end = after.find(',').unwrap_or(after.len());
        rest = &after[descriptor_end..];
        (token, after[..descriptor_end].trim())
      }
    };

    let url = match base.relocate(url, depth) {
      Some(relocated) => {
        changed = true;
        relocated
      }
      None => url.to_string(),
    };
    candidates.push(if descriptor.is_empty() {
      url
    } else {
      format!("{url} {descriptor}")
    });
  }

  changed.then(|| candidates.join(", "))
}

fn quoted_value<'c>(caps: &'c Captures) -> (&'static str, &'c str) {
  match (caps.name("dq"), caps.name("sq")) {
    (Some(value), _) => ("\"", value.as_str()),
    (None, Some(value)) => ("'", value.as_str()),
    (None, None) => ("", ""),
  }
}

fn strip_prefix_ignore_case<'r>(value: &'r str, prefix: &str) -> Option<&'r str> {
  let head = value.get(..prefix.len())?;
  head
    .eq_ignore_ascii_case(prefix)
    .then(|| &value[prefix.len()..])
}

fn scheme_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("invalid scheme regex"))
}

fn attribute_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r#"(?i)(?P<lead>\s)(?P<attr>src|href|poster|srcset|data-src)(?P<eq>\s*=\s*)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#,
    )
    .expect("invalid attribute regex")
  })
}

fn css_url_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"url\(\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^)"'\s]+))\s*\)"#)
      .expect("invalid css url regex")
  })
}

fn css_import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"@import\s+(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
      .expect("invalid css import regex")
  })
}

fn script_literal_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?P<open>["'`])/(?P<path>[^"'`\s/][^"'`\s]*)(?P<close>["'`])"#)
      .expect("invalid script literal regex")
  })
}
