//! The scripted rewriter: a Lua script exposing `rewriteQuery(sql)` and
//! `rewriteParse(sql)` globals, each returning the (possibly unchanged) SQL
//! text or raising an error.

use mlua::{Function, Lua, Value};

use crate::errors::RewriteError;

use super::{Rewriter, RewriterFactory};

/// Source of a rewriter script, shared across sessions; each session loads
/// its own [`Lua`] instance from it, since `mlua::Lua` is not `Sync`.
pub struct ScriptRewriterFactory {
    source: String,
}

impl ScriptRewriterFactory {
    pub fn new(source: String) -> Self {
        Self { source }
    }
}

impl RewriterFactory for ScriptRewriterFactory {
    fn new_rewriter(&self) -> Result<Box<dyn Rewriter>, RewriteError> {
        let lua = Lua::new();
        lua.load(&self.source)
            .exec()
            .map_err(|err| RewriteError::new(format!("failed to load rewrite script: {err}")))?;

        require_function(&lua, "rewriteQuery")?;
        require_function(&lua, "rewriteParse")?;

        Ok(Box::new(ScriptRewriter { lua }))
    }
}

fn require_function(lua: &Lua, name: &str) -> Result<(), RewriteError> {
    match lua.globals().get::<_, Value>(name) {
        Ok(Value::Function(_)) => Ok(()),
        Ok(_) => Err(RewriteError::new(format!(
            "rewrite script does not define a '{name}' function"
        ))),
        Err(err) => Err(RewriteError::new(format!(
            "failed to read '{name}' from rewrite script: {err}"
        ))),
    }
}

struct ScriptRewriter {
    lua: Lua,
}

impl ScriptRewriter {
    fn call(&mut self, function_name: &str, sql: &str) -> Result<String, RewriteError> {
        let function: Function = self
            .lua
            .globals()
            .get(function_name)
            .map_err(|err| RewriteError::new(format!("{function_name} is unavailable: {err}")))?;

        function
            .call::<_, String>(sql)
            .map_err(|err| RewriteError::new(format!("{function_name} failed: {err}")))
    }
}

// SAFETY-relevant note: `mlua` is built with the `send` feature, which makes
// `Lua` and `Function` implement `Send`, so this type can live inside a
// session task moved onto a `tokio::spawn`ed future.
impl Rewriter for ScriptRewriter {
    fn rewrite_query(&mut self, sql: &str) -> Result<String, RewriteError> {
        self.call("rewriteQuery", sql)
    }

    fn rewrite_parse(&mut self, sql: &str) -> Result<String, RewriteError> {
        self.call("rewriteParse", sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
        function rewriteQuery(sql)
            return sql:gsub("secret_table", "public_table")
        end

        function rewriteParse(sql)
            return rewriteQuery(sql)
        end
    "#;

    #[test]
    fn runs_script_functions() {
        let factory = ScriptRewriterFactory::new(SCRIPT.to_string());
        let mut rewriter = factory.new_rewriter().unwrap();

        assert_eq!(
            rewriter.rewrite_query("select * from secret_table").unwrap(),
            "select * from public_table"
        );
    }

    #[test]
    fn rejects_script_missing_functions() {
        let factory = ScriptRewriterFactory::new("function rewriteQuery(sql) return sql end".to_string());
        assert!(factory.new_rewriter().is_err());
    }
}
