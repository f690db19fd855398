use serde_json::Value;
use spm_core::plugin::state::LINE_ENDING;
use spm_core::plugin::{LoadedModules, PluginListing};

const GREEN: &str = "32";
const BLUE: &str = "34";
const GRAY: &str = "90";
const BOLD: &str = "1";

#[derive(Clone)]
pub struct Formatter {
    use_colors: bool,
}

impl Formatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// Enabled and disabled groups, each with a header and indented names.
    /// Empty groups are left out.
    pub fn listing(&self, listing: &PluginListing) -> String {
        let mut out = String::new();

        if !listing.enabled.is_empty() {
            self.group(&mut out, self.paint(GREEN, "Enabled plugins:"), &listing.enabled, BOLD);
        }
        if !listing.disabled.is_empty() {
            self.group(&mut out, self.paint(BLUE, "Disabled plugins:"), &listing.disabled, GRAY);
        }

        out
    }

    fn group(&self, out: &mut String, header: String, names: &[String], style: &str) {
        let eol = LINE_ENDING;
        out.push_str(&format!("{eol}  {header}{eol}{eol}"));
        for name in names {
            out.push_str(&format!("    {}{eol}", self.paint(style, name)));
        }
        out.push_str(eol);
    }

    pub fn hooks(&self, loaded: &LoadedModules) -> String {
        if loaded.is_empty() {
            return "No plugins loaded.\n".to_string();
        }

        let mut out = String::new();
        for module in loaded.modules() {
            let hooks = module.module.hook_names();
            let hooks = if hooks.is_empty() {
                self.paint(GRAY, "(no hooks)")
            } else {
                hooks.join(", ")
            };
            out.push_str(&format!("  {}: {hooks}\n", self.paint(BOLD, &module.name)));
        }
        out
    }

    pub fn json(&self, value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }
}
