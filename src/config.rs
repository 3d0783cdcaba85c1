// Generator configuration
//
// Read once at startup (from TOML or built in code) and never mutated afterwards.
//
// ```toml
// templates_dir = "templates"
// custom_templates_dir = "app/templates/word"
// asset_root = "public"
// no_image_path = "img/noimage.emf"
// ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding `default.docx` and the stock templates.
    pub templates_dir: PathBuf,
    /// Searched before `templates_dir` when resolving a named template.
    pub custom_templates_dir: Option<PathBuf>,
    /// Root that server-local image paths (`data-src`) are resolved against.
    pub asset_root: PathBuf,
    /// Embedded in place of an `<img>` that carries no source at all.
    pub no_image_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            custom_templates_dir: None,
            asset_root: PathBuf::from("public"),
            no_image_path: PathBuf::from("img/noimage.emf"),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a TOML file; relative paths inside it are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.templates_dir);
        join(&mut self.asset_root);
        join(&mut self.no_image_path);
        if let Some(dir) = self.custom_templates_dir.as_mut() {
            join(dir);
        }
    }

    /// Template directories in lookup order.
    pub fn template_dirs(&self) -> Vec<&Path> {
        let mut dirs = Vec::with_capacity(2);
        if let Some(custom) = &self.custom_templates_dir {
            dirs.push(custom.as_path());
        }
        dirs.push(self.templates_dir.as_path());
        dirs
    }
}
