//! Template-facing helpers that render asset tags.

use std::collections::HashSet;
use std::fmt::Write;

use basset_fetch::AssetSource;

use crate::loader::{ResolveOptions, Resolution};
use crate::manager::Manager;
use crate::transform::AssetType;

/// One render's worth of directive calls.
///
/// Tag-rendering directives print each asset once per render; a repeated call
/// for the same asset renders nothing.
#[derive(Debug)]
pub struct Directives<'a> {
    manager: &'a Manager,
    options: ResolveOptions,
    emitted: HashSet<String>,
}

impl<'a> Directives<'a> {
    pub fn new(manager: &'a Manager) -> Self {
        Self {
            manager,
            options: manager.default_options(),
            emitted: HashSet::new(),
        }
    }

    /// Overrides the options used for every call.
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// The bare public reference, e.g. for `src` attributes written by hand.
    pub fn asset(&mut self, reference: &str) -> String {
        self.manager.resolve(reference, &self.options)
    }

    /// `<script src="...">`, once per render.
    pub fn script(&mut self, reference: &str, attrs: &[(&str, &str)]) -> String {
        let resolution = self.manager.resolve_detailed(reference, &self.options);
        if !self.first_emit(reference, &resolution) {
            return String::new();
        }
        script_tag(&resolution.reference, attrs)
    }

    /// `<link rel="stylesheet">`, once per render.
    pub fn style(&mut self, reference: &str, attrs: &[(&str, &str)]) -> String {
        let resolution = self.manager.resolve_detailed(reference, &self.options);
        if !self.first_emit(reference, &resolution) {
            return String::new();
        }
        style_tag(&resolution.reference, attrs)
    }

    /// Picks [`script`](Self::script) or [`style`](Self::style) by extension.
    /// Other assets render as their bare reference.
    pub fn basset(&mut self, reference: &str, attrs: &[(&str, &str)]) -> String {
        match self.asset_type(reference) {
            AssetType::Script => self.script(reference, attrs),
            AssetType::Style => self.style(reference, attrs),
            AssetType::Other => {
                let resolution = self.manager.resolve_detailed(reference, &self.options);
                if self.first_emit(reference, &resolution) {
                    escape(&resolution.reference)
                } else {
                    String::new()
                }
            }
        }
    }

    /// Caches a script block. Falls back to an inline `<script>` element.
    pub fn inline_script(&mut self, content: &str, attrs: &[(&str, &str)]) -> String {
        let resolution = self
            .manager
            .resolve_inline("inline.js", content, &self.options);
        if !self.first_emit(content, &resolution) {
            return String::new();
        }
        if resolution.reference.is_empty() {
            format!("<script{}>{}</script>", render_attrs(attrs), content)
        } else {
            script_tag(&resolution.reference, attrs)
        }
    }

    /// Caches a style block. Falls back to an inline `<style>` element.
    pub fn inline_style(&mut self, content: &str, attrs: &[(&str, &str)]) -> String {
        let resolution = self
            .manager
            .resolve_inline("inline.css", content, &self.options);
        if !self.first_emit(content, &resolution) {
            return String::new();
        }
        if resolution.reference.is_empty() {
            format!("<style{}>{}</style>", render_attrs(attrs), content)
        } else {
            style_tag(&resolution.reference, attrs)
        }
    }

    /// Renders a bundle, or its members if the bundle could not be built.
    pub fn bundle(&mut self, name: &str, references: &[&str], attrs: &[(&str, &str)]) -> String {
        let asset_type = self.asset_type(name);
        let resolutions = self
            .manager
            .resolve_bundle(name, references, &self.options);

        let mut out = String::new();
        for resolution in resolutions {
            if !self.first_emit(name, &resolution) {
                continue;
            }
            match asset_type {
                AssetType::Style => out.push_str(&style_tag(&resolution.reference, attrs)),
                AssetType::Script | AssetType::Other => {
                    out.push_str(&script_tag(&resolution.reference, attrs))
                }
            }
        }
        out
    }

    fn asset_type(&self, reference: &str) -> AssetType {
        let ext = AssetSource::parse(reference, self.manager.loader().assets_root())
            .ok()
            .and_then(|source| source.extension());
        AssetType::from_extension(ext.as_deref())
    }

    /// Records the asset as printed; returns false if it already was.
    fn first_emit(&mut self, fallback: &str, resolution: &Resolution) -> bool {
        let id = match &resolution.key {
            Some(key) => key.to_string(),
            None => format!("ref:{}", fallback),
        };
        self.emitted.insert(id)
    }
}

fn script_tag(src: &str, attrs: &[(&str, &str)]) -> String {
    format!("<script src=\"{}\"{}></script>", escape(src), render_attrs(attrs))
}

fn style_tag(href: &str, attrs: &[(&str, &str)]) -> String {
    format!(
        "<link href=\"{}\" rel=\"stylesheet\" type=\"text/css\"{}>",
        escape(href),
        render_attrs(attrs)
    )
}

/// Renders ` name="value"` pairs; an empty value renders a bare attribute.
fn render_attrs(attrs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        if value.is_empty() {
            let _ = write!(out, " {}", escape(name));
        } else {
            let _ = write!(out, " {}=\"{}\"", escape(name), escape(value));
        }
    }
    out
}

/// Escapes text for use inside an HTML attribute.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"/a?b=1&c="<x>"'"#),
            "/a?b=1&amp;c=&quot;&lt;x&gt;&quot;&#39;"
        );
    }

    #[test]
    fn test_tags() {
        assert_eq!(
            script_tag("/storage/a.js", &[("defer", ""), ("nonce", "n\"1")]),
            r#"<script src="/storage/a.js" defer nonce="n&quot;1"></script>"#
        );
        assert_eq!(
            style_tag("/storage/a.css", &[]),
            r#"<link href="/storage/a.css" rel="stylesheet" type="text/css">"#
        );
    }
}
