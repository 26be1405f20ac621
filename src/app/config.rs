//! Configuration: a one-shot TOML file, optionally overridden by CLI flags.
//! No includes, no hot-reload — the proxy is restarted to pick up changes.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::Error;
use crate::rewrite::substring::{SubstringRewriterFactory, SubstringRules};
use crate::rewrite::RewriterFactory;

use super::args::Args;

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub upstream: Option<SocketAddr>,
    #[serde(default)]
    pub rules: Vec<String>,
    pub lua_file: Option<String>,
}

/// Resolved configuration: CLI flags take precedence over the config file,
/// and the config file's values fill in whatever CLI left at its default.
pub struct Config {
    pub listen: SocketAddr,
    pub upstream: SocketAddr,
    pub rules: Vec<String>,
    pub lua_file: Option<String>,
}

pub fn load(args: &Args) -> Result<Config, Error> {
    let file = match &args.config_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| Error::Config(format!("failed to read {path}: {err}")))?;
            toml::from_str::<FileConfig>(&text)
                .map_err(|err| Error::Config(format!("failed to parse {path}: {err}")))?
        }
        None => FileConfig::default(),
    };

    let mut rules = args.rules.clone();
    if rules.is_empty() {
        rules = file.rules;
    }

    let lua_file = args.lua_file.clone().or(file.lua_file);

    if !rules.is_empty() && lua_file.is_some() {
        return Err(Error::Config(
            "--rule and --lua-file are mutually exclusive".to_string(),
        ));
    }

    Ok(Config {
        listen: file.listen.unwrap_or(args.listen),
        upstream: file.upstream.unwrap_or(args.upstream),
        rules,
        lua_file,
    })
}

/// Build the one rewriter factory this run will use: substring rules take
/// precedence if both are somehow set (already rejected above), falling
/// back to a no-op substring factory with an empty rule set.
pub fn build_rewriter_factory(config: &Config) -> Result<Arc<dyn RewriterFactory>, Error> {
    if let Some(path) = &config.lua_file {
        let source = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("failed to read {path}: {err}")))?;
        return Ok(Arc::new(crate::rewrite::lua::ScriptRewriterFactory::new(
            source,
        )));
    }

    let mut rules = SubstringRules::new();
    for rule in &config.rules {
        let (old, new) = SubstringRules::parse_rule(rule).map_err(|err| Error::Config(err.0))?;
        rules.insert(old, new);
    }

    Ok(Arc::new(SubstringRewriterFactory::new(rules)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use super::super::args::LogFormat;

    fn base_args() -> Args {
        Args {
            listen: "0.0.0.0:6432".parse().unwrap(),
            upstream: "127.0.0.1:5432".parse().unwrap(),
            config_file: None,
            rules: Vec::new(),
            lua_file: None,
            log_level: tracing::Level::INFO,
            log_format: LogFormat::Text,
            no_color: false,
        }
    }

    #[test]
    fn cli_rules_win_when_both_are_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"rules = ["from_file/x"]"#).unwrap();

        let mut args = base_args();
        args.config_file = Some(file.path().to_str().unwrap().to_string());
        args.rules = vec!["from_cli/y".to_string()];

        let config = load(&args).unwrap();
        assert_eq!(config.rules, vec!["from_cli/y".to_string()]);
    }

    #[test]
    fn file_rules_used_when_cli_gives_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"listen = "127.0.0.1:9999"
rules = ["from_file/x"]"#)
            .unwrap();

        let mut args = base_args();
        args.config_file = Some(file.path().to_str().unwrap().to_string());

        let config = load(&args).unwrap();
        assert_eq!(config.rules, vec!["from_file/x".to_string()]);
        assert_eq!(config.listen, "127.0.0.1:9999".parse().unwrap());
    }

    #[test]
    fn rejects_rule_and_lua_file_together() {
        let mut args = base_args();
        args.rules = vec!["a/b".to_string()];
        args.lua_file = Some("/nonexistent.lua".to_string());

        assert!(load(&args).is_err());
    }

    #[test]
    fn build_rewriter_factory_rejects_malformed_rule() {
        let mut args = base_args();
        args.rules = vec!["no-separator".to_string()];
        let config = load(&args).unwrap();

        assert!(build_rewriter_factory(&config).is_err());
    }
}
