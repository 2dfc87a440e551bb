//! Canonical textual form of a project's fully-resolved model.
//!
//! The rendered text is what gets hashed into the `pom` digest item, so it
//! must be byte-identical across machines and operating systems for
//! semantically equal models. Environment-specific tokens are rewritten to
//! stable placeholders before rendering.

use crate::{config::CacheConfig, host::ConfigNode, utils};
use std::fmt::Write;

/// Environment token rewrites applied to text and attribute values, in order.
pub const ENV_REWRITES: &[(&str, &str)] = &[
    ("windows", "os.classifier"),
    ("linux", "os.classifier"),
];

/// Renders a [`ConfigNode`] model into its canonical text.
#[derive(Debug)]
pub struct ModelNormalizer<'a> {
    /// Slash-rendered absolute base dir, erased from the output.
    base_dir: String,
    config: &'a CacheConfig,
}

impl<'a> ModelNormalizer<'a> {
    pub fn new(base_dir: &std::path::Path, config: &'a CacheConfig) -> Self {
        Self { base_dir: utils::to_slash(base_dir), config }
    }

    /// Produces the canonical form of the model. Repeated elements keep
    /// their declaration order; only values are rewritten.
    pub fn normalize(&self, model: &ConfigNode) -> String {
        let mut out = String::new();
        self.render(model, &[], &mut out);
        out
    }

    fn render(&self, node: &ConfigNode, excluded: &[String], mut out: &mut String) {
        if excluded.iter().any(|name| *name == node.name) {
            return;
        }

        out.push('<');
        out.push_str(&node.name);
        for (name, value) in &node.attributes {
            let _ = write!(&mut out, " {}=\"{}\"", name, self.rewrite(value));
        }
        out.push('>');
        if let Some(value) = &node.value {
            out.push_str(&self.rewrite(value));
        }

        // per-plugin excludeProperties drop configuration entries of that
        // plugin from the canonical form
        let excluded = if node.name == "plugin" {
            node.child_value("artifactId")
                .and_then(|artifact_id| self.config.plugin_input(artifact_id))
                .map(|plugin| plugin.exclude_properties.clone())
                .unwrap_or_default()
        } else {
            excluded.to_vec()
        };

        for child in &node.children {
            self.render(child, &excluded, out);
        }
        out.push_str("</");
        out.push_str(&node.name);
        out.push('>');
    }

    fn rewrite(&self, value: &str) -> String {
        let mut value = value.replace(&self.base_dir, "").replace('\\', "/");
        for (token, placeholder) in ENV_REWRITES {
            value = value.replace(token, placeholder);
        }
        value
    }
}
