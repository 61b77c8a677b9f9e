use env_logger::Env;
use formula::{
    EngineError, EvaluationError, Evaluator, ExternalFunction, FunctionRegistry, ResolutionError,
};
use rustyline::error::ReadlineError;
use std::sync::Arc;

mod repl {
    use super::*;

    pub fn evalexpr(input: &str) {
        match formula::compile(input).and_then(|e| Ok((e.value()?, e))) {
            Err(e) => println!("Error: {}", e),
            Ok((value, e)) => println!("{} = {}", e, value),
        }
    }

    // 'name = formula', but not '==', '<=', '>=' or '!='
    fn split_assignment(input: &str) -> Option<(&str, &str)> {
        let (lhs, rhs) = input.split_once('=')?;
        if rhs.starts_with('=') || lhs.ends_with(|c: char| "<>!".contains(c)) {
            return None;
        }
        let name = lhs.trim();
        let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if valid {
            Some((name, rhs.trim()))
        } else {
            None
        }
    }

    // compile 'text' taking every name the registry doesn't know as a variable
    fn compile(registry: &Arc<FunctionRegistry>, text: &str) -> Result<Evaluator, EngineError> {
        let free: Vec<String> = formula::compile_with_registry(text, registry)?
            .variable_names()
            .into_iter()
            .filter(|name| !registry.contains(name))
            .collect();
        formula::compile_with_variables_and_registry(&free, text, registry)
    }

    fn assign(registry: &mut Arc<FunctionRegistry>, name: &str, text: &str) -> Result<String, EngineError> {
        let e = compile(registry, text)?;
        let variables = e.variable_names();
        let registry = Arc::make_mut(registry);
        if variables.is_empty() {
            let value = e.value()?;
            registry.register_constant(name, value)?;
            Ok(format!("{} = {}", name, value))
        } else {
            registry.register_formula_with_variables(name, &variables, text)?;
            Ok(format!("{}({}) = {}", name, variables.join(", "), e))
        }
    }

    fn derivative(registry: &Arc<FunctionRegistry>, name: &str, var: &str) -> Result<String, EngineError> {
        match registry.get(name) {
            Some(ExternalFunction::Formula(e)) => {
                let d = e.clone().with_functions(registry.clone()).differentiate(var)?;
                Ok(format!("d{}/d{} = {}", name, var, d))
            }
            Some(_) => Err(EvaluationError::NotDifferentiable(name.to_string()).into()),
            None => Err(ResolutionError::UnknownFunction(name.to_string()).into()),
        }
    }

    fn evaluate(registry: &Arc<FunctionRegistry>, text: &str) -> Result<String, EngineError> {
        let e = compile(registry, text)?;
        if let Some(free) = e.variable_names().first() {
            return Err(ResolutionError::UnknownVariable(free.clone()).into());
        }
        Ok(e.value()?.to_string())
    }

    pub fn parse_statement(registry: &mut Arc<FunctionRegistry>, input: &str) -> Result<String, EngineError> {
        if let Some((name, text)) = split_assignment(input) {
            return assign(registry, name, text);
        }
        let words: Vec<&str> = input.split_whitespace().collect();
        if let ["d", name, var] = words.as_slice() {
            return derivative(registry, name, var);
        }
        evaluate(registry, input)
    }
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    if std::env::args().len() > 1 {
        let input = std::env::args().skip(1).collect::<Vec<String>>().join(" ");
        repl::evalexpr(&input);
        return Ok(());
    }

    let history = dirs::home_dir().map(|home| home.join(".formula_history"));
    let mut rl = rustyline::DefaultEditor::new().map_err(|e| e.to_string())?;
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }
    let mut registry = Arc::new(FunctionRegistry::new());
    loop {
        match rl.readline(">> ") {
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("Readline err: {:?}", e)),
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                match repl::parse_statement(&mut registry, line) {
                    Err(e) => println!("Error: {}", e),
                    Ok(output) => println!("{}", output),
                }
            }
        }
    }
    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}
