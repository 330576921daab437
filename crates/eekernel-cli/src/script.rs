//! Line-oriented scenario scripts.
//!
//! One command per line; `#` starts a comment. Numbers may be decimal,
//! negative, or `0x` hex.

use anyhow::{anyhow, bail, Context, Result};
use eekernel_hw::InterruptLine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// InitializeMainThread with the given stack size.
    Boot { stack_size: u32 },
    Thread { entry: u32, priority: u32 },
    Start { tid: u32, arg: u32 },
    Sema { init: i32, max: i32 },
    Wait { sid: u32 },
    Signal { sid: u32 },
    Sleep,
    Wakeup { tid: u32 },
    ExitThread,
    /// Raw kernel call by number.
    Call { number: i32, args: Vec<u32> },
    Handler { line: InterruptLine, cause: u32 },
    Enable { line: InterruptLine, cause: u32 },
    Raise { line: InterruptLine, cause: u32 },
    Alarm { ticks: u32 },
    Tick { ticks: u32 },
    Status,
}

pub fn parse_number(word: &str) -> Result<i64> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .with_context(|| format!("bad number `{word}`"))?;
    Ok(if negative { -value } else { value })
}

fn word(value: i64) -> u32 {
    value as u32
}

fn parse_line_name(name: &str) -> Result<InterruptLine> {
    match name {
        "intc" => Ok(InterruptLine::Intc),
        "dmac" => Ok(InterruptLine::Dmac),
        other => bail!("unknown interrupt line `{other}` (expected intc or dmac)"),
    }
}

struct Args<'a> {
    words: std::slice::Iter<'a, &'a str>,
    command: &'a str,
}

impl<'a> Args<'a> {
    fn next(&mut self) -> Result<&'a str> {
        self.words
            .next()
            .copied()
            .ok_or_else(|| anyhow!("`{}` is missing an argument", self.command))
    }

    fn number(&mut self) -> Result<i64> {
        parse_number(self.next()?)
    }

    fn number_or(&mut self, default: i64) -> Result<i64> {
        match self.words.next() {
            Some(w) => parse_number(w),
            None => Ok(default),
        }
    }

    fn line_and_cause(&mut self) -> Result<(InterruptLine, u32)> {
        let line = parse_line_name(self.next()?)?;
        Ok((line, word(self.number()?)))
    }

    fn rest(&mut self) -> Result<Vec<u32>> {
        self.words.by_ref().map(|w| parse_number(w).map(word)).collect()
    }
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let (&name, rest) = words
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut args = Args {
        words: rest.iter(),
        command: name,
    };

    let command = match name {
        "boot" => Command::Boot {
            stack_size: word(args.number_or(0x4000)?),
        },
        "thread" => Command::Thread {
            entry: word(args.number()?),
            priority: word(args.number()?),
        },
        "start" => Command::Start {
            tid: word(args.number()?),
            arg: word(args.number_or(0)?),
        },
        "sema" => Command::Sema {
            init: args.number()? as i32,
            max: args.number()? as i32,
        },
        "wait" => Command::Wait {
            sid: word(args.number()?),
        },
        "signal" => Command::Signal {
            sid: word(args.number()?),
        },
        "sleep" => Command::Sleep,
        "wakeup" => Command::Wakeup {
            tid: word(args.number()?),
        },
        "exit-thread" => Command::ExitThread,
        "call" => Command::Call {
            number: args.number()? as i32,
            args: args.rest()?,
        },
        "handler" => {
            let (line, cause) = args.line_and_cause()?;
            Command::Handler { line, cause }
        }
        "enable" => {
            let (line, cause) = args.line_and_cause()?;
            Command::Enable { line, cause }
        }
        "raise" => {
            let (line, cause) = args.line_and_cause()?;
            Command::Raise { line, cause }
        }
        "alarm" => Command::Alarm {
            ticks: word(args.number()?),
        },
        "tick" => Command::Tick {
            ticks: word(args.number()?),
        },
        "status" => Command::Status,
        other => bail!("unknown command `{other}`"),
    };
    if args.words.next().is_some() {
        bail!("`{name}` has trailing arguments");
    }
    Ok(Some(command))
}

/// Parses a whole script, reporting the offending line number on error.
pub fn parse(source: &str) -> Result<Vec<(usize, Command)>> {
    let mut commands = Vec::new();
    for (i, line) in source.lines().enumerate() {
        if let Some(command) = parse_command(line).with_context(|| format!("line {}", i + 1))? {
            commands.push((i + 1, command));
        }
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex_and_sign() {
        assert_eq!(parse_number("0x10").unwrap(), 16);
        assert_eq!(parse_number("-67").unwrap(), -67);
        assert!(parse_number("ten").is_err());
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let script = "# setup\n\nboot\nthread 0x2000 10 # worker\n";
        let commands = parse(script).unwrap();
        assert_eq!(
            commands,
            vec![
                (3, Command::Boot { stack_size: 0x4000 }),
                (4, Command::Thread { entry: 0x2000, priority: 10 }),
            ]
        );
    }

    #[test]
    fn raw_calls_keep_every_argument() {
        assert_eq!(
            parse_command("call -67 3").unwrap(),
            Some(Command::Call { number: -67, args: vec![3] })
        );
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse("boot\nraise gpu 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(parse_command("wait").is_err());
        assert!(parse_command("sleep now").is_err());
    }
}
