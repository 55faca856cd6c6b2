//! # coedit CLI
//!
//! Offline utilities for computing, applying, and transforming operations.
//! Operations are read and written as JSON.

use anyhow::{Context, Result};
use coedit_core::{transform_with_tie, ClampPolicy, Operation, TieBreak};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "diff" => {
            if args.len() < 4 {
                eprintln!("Usage: coedit diff <old> <new>");
                std::process::exit(1);
            }
            println!("{}", diff(&args[2], &args[3])?);
        }
        "apply" => {
            if args.len() < 4 {
                eprintln!("Usage: coedit apply <content> <op-json> [--strict]");
                std::process::exit(1);
            }
            let policy = if args.iter().any(|a| a == "--strict") {
                ClampPolicy::Strict
            } else {
                ClampPolicy::Clamp
            };
            println!("{}", apply(&args[2], &args[3], policy)?);
        }
        "transform" => {
            if args.len() < 4 {
                eprintln!("Usage: coedit transform <op-json> <applied-json> [--op-first]");
                std::process::exit(1);
            }
            let tie = if args.iter().any(|a| a == "--op-first") {
                TieBreak::OpFirst
            } else {
                TieBreak::AppliedFirst
            };
            println!("{}", transform(&args[2], &args[3], tie)?);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_op(json: &str) -> Result<Operation> {
    serde_json::from_str(json).with_context(|| format!("Invalid operation: {json}"))
}

fn diff(old: &str, new: &str) -> Result<String> {
    match coedit_core::diff(old, new) {
        Some(op) => Ok(serde_json::to_string(&op)?),
        None => Ok("null".to_string()),
    }
}

fn apply(content: &str, op: &str, policy: ClampPolicy) -> Result<String> {
    let op = parse_op(op)?;
    policy.apply(content, &op).context("Failed to apply operation")
}

fn transform(op: &str, applied: &str, tie: TieBreak) -> Result<String> {
    let op = parse_op(op)?;
    let applied = parse_op(applied)?;
    match transform_with_tie(&op, &applied, tie) {
        Some(op) => Ok(serde_json::to_string(&op)?),
        None => Ok("null".to_string()),
    }
}

fn print_help() {
    println!(
        r#"coedit CLI

USAGE:
    coedit <COMMAND> [OPTIONS]

COMMANDS:
    diff <old> <new>                   Print the operation turning <old> into <new>
    apply <content> <op> [--strict]    Apply an operation; --strict rejects overlong removals
    transform <op> <applied> [--op-first]
                                       Rebase <op> over an already applied operation
    help                               Show this help message

EXAMPLES:
    coedit diff "Hello" "Hello World"
    coedit apply "Hello" '{{"type":"insert","position":5,"text":"!"}}'
    coedit transform '{{"type":"insert","position":0,"text":"A"}}' '{{"type":"delete","position":0,"length":2}}'
"#
    );
}
