use std::sync::Arc;

use crate::context::EvaluationContext;
use crate::error::TemplateError;
use crate::functions;
use crate::parser::{called_functions, parse_template, Command, Node, Operand, Pipeline};
use crate::value::Value;

/// Evaluates `{{ ... }}` expressions against a shared [`EvaluationContext`].
///
/// Cheap to clone; clones share the same context.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    ctx: Arc<EvaluationContext>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(Arc::new(EvaluationContext::new()))
    }
}

impl TemplateEngine {
    pub fn new(ctx: Arc<EvaluationContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<EvaluationContext> {
        &self.ctx
    }

    /// Parse and check function names without running anything.
    pub fn validate(&self, expr: &str) -> Result<(), TemplateError> {
        let nodes = parse_template(expr)?;
        check_functions(&nodes)
    }

    pub fn evaluate_to_string(&self, expr: &str) -> Result<String, TemplateError> {
        let nodes = parse_template(expr)?;
        check_functions(&nodes)?;

        let mut out = String::with_capacity(expr.len());
        for node in &nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => out.push_str(&self.run_pipeline(pipeline)?.into_string()),
            }
        }
        Ok(out)
    }

    /// Evaluate and read the trimmed output as a base-10 integer.
    pub fn evaluate_to_integer(&self, expr: &str) -> Result<i64, TemplateError> {
        let rendered = self.evaluate_to_string(expr)?;
        rendered
            .trim()
            .parse::<i64>()
            .map_err(|_| TemplateError::NotAnInteger(rendered))
    }

    fn run_pipeline(&self, pipeline: &Pipeline) -> Result<Value, TemplateError> {
        let mut piped: Option<Value> = None;
        for command in &pipeline.commands {
            piped = Some(self.run_command(command, piped.take())?);
        }
        piped.ok_or_else(|| TemplateError::exec("empty pipeline"))
    }

    fn run_command(&self, command: &Command, piped: Option<Value>) -> Result<Value, TemplateError> {
        match command {
            Command::Call { name, args } => {
                let mut values = args
                    .iter()
                    .map(|a| self.operand(a))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                functions::call(name, values, &self.ctx)
            }
            Command::Value(operand) => {
                if piped.is_some() {
                    return Err(TemplateError::exec(
                        "cannot pipe a value into a non-function command",
                    ));
                }
                self.operand(operand)
            }
        }
    }

    fn operand(&self, operand: &Operand) -> Result<Value, TemplateError> {
        match operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Call(name) => functions::call(name, Vec::new(), &self.ctx),
            Operand::Nested(p) => self.run_pipeline(p),
            Operand::Field(path) => self.field(path),
        }
    }

    fn field(&self, path: &[String]) -> Result<Value, TemplateError> {
        match path {
            [root, name] if root == "Variables" => Ok(Value::Str(self.ctx.variable(name))),
            [root] if root == "Sequence" => Ok(Value::Int(self.ctx.current_sequence())),
            [root] if root == "Seed" => Ok(Value::Int(
                self.ctx.seed().map(|s| s as i64).unwrap_or_default(),
            )),
            _ => Err(TemplateError::exec(format!(
                "can't evaluate field .{}",
                path.join(".")
            ))),
        }
    }
}

fn check_functions(nodes: &[Node]) -> Result<(), TemplateError> {
    match called_functions(nodes)
        .into_iter()
        .find(|name| !functions::is_known(name))
    {
        Some(unknown) => Err(TemplateError::UnknownFunction(unknown.to_string())),
        None => Ok(()),
    }
}
