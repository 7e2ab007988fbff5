//! Doodle Engine
//!
//! A deliberately small turtle language that exercises every part of the
//! host contract: drawing, captured output, and the blocking input call.
//!
//! ```text
//! # a square, then a question
//! pencolor "tomato"
//! repeat 4 [ forward 50 right 90 ]
//! ask name "What is your name? "
//! say name
//! ```
//!
//! Statements are verbs with a fixed number of arguments; arguments are
//! numbers, double-quoted strings (no escapes), or variable names. The only
//! way to bind a variable is `ask`, which suspends the script until the
//! presentation side replies. `repeat N [ ... ]` nests. `#` comments run to
//! end of line. A string where a number is needed is parsed as one, and a
//! failed parse is a script error; `speed` is the lenient exception, where
//! anything unreadable falls back to the maximum, as turtle speed
//! traditionally does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{alpha1, char, multispace1, not_line_ending},
    combinator::{map, opt, verify},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use parking_lot::Mutex;

use super::{EngineError, EngineHost, ScriptEngine};
use crate::turtle::TurtleCall;

/// The bundled reference engine for the doodle language.
///
/// Construction is trivial; [`boot`](ScriptEngine::boot) just captures the
/// host. The instance survives across runs, and variables do not: each
/// `exec` starts with a fresh scope.
#[derive(Default)]
pub struct DoodleEngine {
    host: Mutex<Option<Arc<dyn EngineHost>>>,
}

impl DoodleEngine {
    /// An engine with no host yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptEngine for DoodleEngine {
    fn name(&self) -> &str {
        "doodle"
    }

    async fn boot(&self, host: Arc<dyn EngineHost>) -> Result<(), EngineError> {
        *self.host.lock() = Some(host);
        Ok(())
    }

    async fn exec(&self, source: &str) -> Result<(), EngineError> {
        let host = { self.host.lock().clone() };
        let host = host.ok_or_else(|| EngineError::Boot("engine used before boot".to_string()))?;
        let program = parse_program(source)?;
        let mut interp = Interp {
            host,
            vars: HashMap::new(),
        };
        interp.exec_block(&program).await
    }
}

// ============================================
// Syntax
// ============================================

#[derive(Clone, Debug, PartialEq)]
enum Arg {
    Num(f64),
    Str(String),
    Var(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Stmt {
    Command { verb: String, args: Vec<Arg> },
    Repeat { count: Arg, body: Vec<Stmt> },
    Ask { var: String, prompt: String },
}

/// Words that introduce special forms rather than plain commands.
const RESERVED: &[&str] = &["repeat", "ask"];

/// Arguments each verb takes. Parsing is arity-directed, which is what
/// keeps a newline-insensitive grammar unambiguous: the next identifier
/// after a saturated command can only be the next verb.
fn verb_arity(verb: &str) -> Option<usize> {
    Some(match verb {
        "penup" | "pu" | "pendown" | "pd" | "home" | "hideturtle" | "ht" | "showturtle"
        | "st" | "clear" | "cs" => 0,
        "forward" | "fd" | "back" | "bk" | "backward" | "left" | "lt" | "right" | "rt"
        | "pencolor" | "pensize" | "speed" | "bgcolor" | "say" => 1,
        "goto" | "setpos" | "setposition" => 2,
        _ => return None,
    })
}

/// Whitespace and `#` comments, any amount including none.
fn junk(input: &str) -> IResult<&str, ()> {
    map(
        many0(alt((
            map(multispace1, |_| ()),
            map(pair(char('#'), not_line_ending), |_| ()),
        ))),
        |_| (),
    )(input)
}

fn ident(input: &str) -> IResult<&str, String> {
    verify(map(alpha1, |s: &str| s.to_string()), |s: &String| {
        !RESERVED.contains(&s.as_str())
    })(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    verify(alpha1, move |s: &str| s == word)
}

fn quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        |s: &str| s.to_string(),
    )(input)
}

fn arg(input: &str) -> IResult<&str, Arg> {
    alt((
        map(quoted, Arg::Str),
        map(ident, Arg::Var),
        map(double, Arg::Num),
    ))(input)
}

fn command(original: &str) -> IResult<&str, Stmt> {
    let (mut input, verb) = ident(original)?;
    let Some(arity) = verb_arity(&verb) else {
        // Unknown verb: no point backtracking to try other alternatives.
        return Err(nom::Err::Failure(nom::error::Error::new(
            original,
            nom::error::ErrorKind::Verify,
        )));
    };
    let mut args = Vec::with_capacity(arity);
    for _ in 0..arity {
        let (rest, a) = preceded(junk, arg)(input)?;
        input = rest;
        args.push(a);
    }
    Ok((input, Stmt::Command { verb, args }))
}

fn repeat_stmt(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = keyword("repeat")(input)?;
    let (input, count) = preceded(junk, arg)(input)?;
    let (input, body) = preceded(junk, delimited(char('['), statements, char(']')))(input)?;
    Ok((input, Stmt::Repeat { count, body }))
}

fn ask_stmt(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = keyword("ask")(input)?;
    let (input, var) = preceded(junk, ident)(input)?;
    let (input, prompt) = opt(preceded(junk, quoted))(input)?;
    Ok((
        input,
        Stmt::Ask {
            var,
            prompt: prompt.unwrap_or_default(),
        },
    ))
}

fn statement(input: &str) -> IResult<&str, Stmt> {
    alt((repeat_stmt, ask_stmt, command))(input)
}

fn statements(input: &str) -> IResult<&str, Vec<Stmt>> {
    terminated(many0(preceded(junk, statement)), junk)(input)
}

fn parse_program(source: &str) -> Result<Vec<Stmt>, EngineError> {
    match statements(source) {
        Ok(("", program)) => Ok(program),
        Ok((rest, _)) => Err(syntax_error(rest)),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(syntax_error(e.input)),
        Err(nom::Err::Incomplete(_)) => {
            Err(EngineError::Script("unexpected end of script".to_string()))
        }
    }
}

fn syntax_error(rest: &str) -> EngineError {
    let snippet: String = rest.chars().take(24).collect();
    EngineError::Script(format!("syntax error near {snippet:?}"))
}

// ============================================
// Evaluation
// ============================================

struct Interp {
    host: Arc<dyn EngineHost>,
    vars: HashMap<String, String>,
}

impl Interp {
    fn exec_block<'a>(&'a mut self, block: &'a [Stmt]) -> BoxFuture<'a, Result<(), EngineError>> {
        async move {
            for stmt in block {
                match stmt {
                    Stmt::Command { verb, args } => self.exec_command(verb, args).await?,
                    Stmt::Repeat { count, body } => {
                        let n = self.num(count)?;
                        let n = if n.is_finite() && n > 0.0 { n as u64 } else { 0 };
                        for _ in 0..n {
                            self.exec_block(body).await?;
                        }
                    }
                    Stmt::Ask { var, prompt } => {
                        let reply = self.host.read_line(prompt).await?;
                        self.vars.insert(var.clone(), reply);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn exec_command(&self, verb: &str, args: &[Arg]) -> Result<(), EngineError> {
        let call = match verb {
            "forward" | "fd" => TurtleCall::Forward(self.num(self.arg(args, 0)?)?),
            "back" | "bk" | "backward" => TurtleCall::Backward(self.num(self.arg(args, 0)?)?),
            "left" | "lt" => TurtleCall::Left(self.num(self.arg(args, 0)?)?),
            "right" | "rt" => TurtleCall::Right(self.num(self.arg(args, 0)?)?),
            "penup" | "pu" => TurtleCall::PenUp,
            "pendown" | "pd" => TurtleCall::PenDown,
            "goto" | "setpos" | "setposition" => TurtleCall::Goto {
                x: self.num(self.arg(args, 0)?)?,
                y: self.num(self.arg(args, 1)?)?,
            },
            "home" => TurtleCall::Home,
            "pencolor" => TurtleCall::PenColor(Some(self.text(self.arg(args, 0)?)?)),
            "pensize" => TurtleCall::PenWidth(self.num(self.arg(args, 0)?)?),
            "speed" => {
                let text = self.text(self.arg(args, 0)?)?;
                TurtleCall::Speed(Some(text.trim().parse().unwrap_or(f64::NAN)))
            }
            "hideturtle" | "ht" => TurtleCall::Hide,
            "showturtle" | "st" => TurtleCall::Show,
            "clear" | "cs" => TurtleCall::Clear,
            "bgcolor" => TurtleCall::Background(self.text(self.arg(args, 0)?)?),
            "say" => {
                let text = self.text(self.arg(args, 0)?)?;
                self.host.stdout(&format!("{text}\n"));
                return Ok(());
            }
            other => {
                return Err(EngineError::Script(format!("unknown command {other:?}")));
            }
        };
        self.host.turtle(call);
        Ok(())
    }

    fn arg<'a>(&self, args: &'a [Arg], index: usize) -> Result<&'a Arg, EngineError> {
        args.get(index)
            .ok_or_else(|| EngineError::Script("missing argument".to_string()))
    }

    fn num(&self, arg: &Arg) -> Result<f64, EngineError> {
        let text = match arg {
            Arg::Num(n) => return Ok(*n),
            Arg::Str(s) => s.clone(),
            Arg::Var(_) => self.text(arg)?,
        };
        text.trim()
            .parse()
            .map_err(|_| EngineError::Script(format!("expected a number, got {text:?}")))
    }

    fn text(&self, arg: &Arg) -> Result<String, EngineError> {
        match arg {
            Arg::Num(n) => Ok(n.to_string()),
            Arg::Str(s) => Ok(s.clone()),
            Arg::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::Script(format!("unknown variable {name:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turtle::TurtleReply;
    use parking_lot::Mutex as PlMutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingHost {
        stdout: PlMutex<String>,
        stderr: PlMutex<String>,
        calls: PlMutex<Vec<TurtleCall>>,
        replies: PlMutex<VecDeque<String>>,
    }

    impl RecordingHost {
        fn with_replies(replies: &[&str]) -> Self {
            Self {
                replies: PlMutex::new(replies.iter().map(|s| s.to_string()).collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl EngineHost for RecordingHost {
        fn stdout(&self, chunk: &str) {
            self.stdout.lock().push_str(chunk);
        }

        fn stderr(&self, chunk: &str) {
            self.stderr.lock().push_str(chunk);
        }

        async fn read_line(&self, _prompt: &str) -> Result<String, EngineError> {
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| EngineError::Script("no reply scripted".to_string()))
        }

        fn turtle(&self, call: TurtleCall) -> TurtleReply {
            self.calls.lock().push(call);
            TurtleReply::None
        }
    }

    async fn run(source: &str, host: Arc<RecordingHost>) -> Result<(), EngineError> {
        let engine = DoodleEngine::new();
        engine.boot(Arc::clone(&host) as Arc<dyn EngineHost>).await.unwrap();
        engine.exec(source).await
    }

    #[test]
    fn test_parse_square() {
        let program = parse_program("repeat 4 [ forward 50 right 90 ]").unwrap();
        assert_eq!(program.len(), 1);
        match &program[0] {
            Stmt::Repeat { count, body } => {
                assert_eq!(*count, Arg::Num(4.0));
                assert_eq!(body.len(), 2);
                assert_eq!(
                    body[0],
                    Stmt::Command {
                        verb: "forward".to_string(),
                        args: vec![Arg::Num(50.0)],
                    }
                );
            }
            other => panic!("expected repeat, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_comments_and_newlines() {
        let source = "# warm up\npenup\n  goto -20 35 # off we go\npendown\n";
        let program = parse_program(source).unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(
            program[1],
            Stmt::Command {
                verb: "goto".to_string(),
                args: vec![Arg::Num(-20.0), Arg::Num(35.0)],
            }
        );
    }

    #[test]
    fn test_parse_ask_with_and_without_prompt() {
        let program = parse_program("ask name \"Who? \"\nask color").unwrap();
        assert_eq!(
            program[0],
            Stmt::Ask {
                var: "name".to_string(),
                prompt: "Who? ".to_string(),
            }
        );
        assert_eq!(
            program[1],
            Stmt::Ask {
                var: "color".to_string(),
                prompt: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_verb() {
        let err = parse_program("frobnicate 3").unwrap_err();
        assert!(matches!(err, EngineError::Script(_)));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_parse_rejects_unbalanced_block() {
        assert!(parse_program("repeat 2 [ fd 10").is_err());
        assert!(parse_program("fd 10 ]").is_err());
    }

    #[tokio::test]
    async fn test_exec_square_issues_alternating_calls() {
        let host = Arc::new(RecordingHost::default());
        run("repeat 4 [ fd 50 rt 90 ]", Arc::clone(&host)).await.unwrap();

        let calls = host.calls.lock();
        assert_eq!(calls.len(), 8);
        for pair in calls.chunks(2) {
            assert_eq!(pair[0], TurtleCall::Forward(50.0));
            assert_eq!(pair[1], TurtleCall::Right(90.0));
        }
    }

    #[tokio::test]
    async fn test_exec_nested_repeat() {
        let host = Arc::new(RecordingHost::default());
        run("repeat 2 [ repeat 3 [ fd 1 ] ]", Arc::clone(&host))
            .await
            .unwrap();
        assert_eq!(host.calls.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_repeat_nonpositive_count_runs_zero_times() {
        let host = Arc::new(RecordingHost::default());
        run("repeat 0 [ fd 1 ] repeat -3 [ fd 1 ]", Arc::clone(&host))
            .await
            .unwrap();
        assert!(host.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_say_writes_line_to_stdout() {
        let host = Arc::new(RecordingHost::default());
        run("say \"hello\"\nsay 42", Arc::clone(&host)).await.unwrap();
        assert_eq!(*host.stdout.lock(), "hello\n42\n");
    }

    #[tokio::test]
    async fn test_ask_binds_variable_used_later() {
        let host = Arc::new(RecordingHost::with_replies(&["5"]));
        run("ask n \"how far? \"\nforward n\nsay n", Arc::clone(&host))
            .await
            .unwrap();

        assert_eq!(host.calls.lock().as_slice(), &[TurtleCall::Forward(5.0)]);
        assert_eq!(*host.stdout.lock(), "5\n");
    }

    #[tokio::test]
    async fn test_two_asks_resolve_in_order() {
        let host = Arc::new(RecordingHost::with_replies(&["first", "second"]));
        run("ask a\nask b\nsay a\nsay b", Arc::clone(&host))
            .await
            .unwrap();
        assert_eq!(*host.stdout.lock(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_non_numeric_distance_is_script_error() {
        let host = Arc::new(RecordingHost::default());
        let err = run("forward \"far\"", Arc::clone(&host)).await.unwrap_err();
        assert!(err.to_string().contains("expected a number"));
    }

    #[tokio::test]
    async fn test_unknown_variable_is_script_error() {
        let host = Arc::new(RecordingHost::default());
        let err = run("forward nowhere", Arc::clone(&host)).await.unwrap_err();
        assert!(err.to_string().contains("unknown variable"));
    }

    #[tokio::test]
    async fn test_speed_tolerates_garbage() {
        let host = Arc::new(RecordingHost::default());
        run("speed \"banana\"", Arc::clone(&host)).await.unwrap();
        let calls = host.calls.lock();
        assert!(
            matches!(calls[0], TurtleCall::Speed(Some(raw)) if raw.is_nan()),
            "garbage speed should pass through as non-finite, got {calls:?}"
        );
    }

    #[tokio::test]
    async fn test_exec_before_boot_is_boot_error() {
        let engine = DoodleEngine::new();
        let err = engine.exec("fd 1").await.unwrap_err();
        assert!(matches!(err, EngineError::Boot(_)));
    }

    #[tokio::test]
    async fn test_variables_reset_between_execs() {
        let host = Arc::new(RecordingHost::with_replies(&["7"]));
        let engine = DoodleEngine::new();
        engine
            .boot(Arc::clone(&host) as Arc<dyn EngineHost>)
            .await
            .unwrap();

        engine.exec("ask n\nsay n").await.unwrap();
        let err = engine.exec("say n").await.unwrap_err();
        assert!(err.to_string().contains("unknown variable"));
    }
}
