use std::path::PathBuf;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

use amendatory::grammar::{self, Grammar};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Path to a grammar file overriding the built-in one
    pub grammar: Option<PathBuf>,
    /// Cap on scoped-range previews in effect diagnostics
    pub preview_limit: usize,
}

impl Settings {
    pub fn new() -> anyhow::Result<Settings> {
        let global = shellexpand::tilde("~/.config/amendatory/settings").to_string();

        let settings = Config::builder()
            .add_source(File::with_name(".amendatory").required(false))
            .add_source(File::with_name(&global).required(false))
            .set_default("preview_limit", 600)
            .map_err(|err| anyhow!("Failed to set defaults: {err}"))?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    pub fn load_grammar(&self) -> anyhow::Result<Grammar> {
        match &self.grammar {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .map_err(|err| anyhow!("Can't read grammar {}: {err}", path.display()))?;
                Grammar::load(&source)
            }
            None => grammar::default_grammar(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Settings;

    #[test]
    fn test_default_settings_load_builtin_grammar() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.preview_limit, 600);
        let grammar = settings.load_grammar().unwrap();
        assert!(grammar.rule_id("instruction").is_some());
    }
}
