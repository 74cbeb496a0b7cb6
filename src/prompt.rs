//! This module implements prompting.

use libc::ECHO;
use libc::ECHOE;
use libc::ICANON;
use libc::STDIN_FILENO;
use libc::TCSANOW;
use libc::VMIN;
use libc::tcgetattr;
use libc::tcsetattr;
use libc::termios;
use std::fmt;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::mem::MaybeUninit;

/// Shows a prompt and returns when a newline is received.
///
/// Arguments:
/// - `prompt` is the prompt's text.
/// - `hidden` tells whether the input is hidden (no local echo).
pub fn prompt<P: fmt::Display>(prompt: P, hidden: bool) -> Option<String> {
    let saved_termios = unsafe {
        let mut t: termios = MaybeUninit::zeroed().assume_init();
        tcgetattr(STDIN_FILENO, &mut t);
        t
    };
    if hidden {
        let mut termios = saved_termios;
        termios.c_lflag &= !(ICANON | ECHO | ECHOE);
        termios.c_cc[VMIN] = 1;
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &termios);
        }
    }
    print!("{prompt}");
    let _ = io::stdout().flush();
    let input = io::stdin().lock().lines().next()?.unwrap_or(String::new());
    if hidden {
        println!();
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &saved_termios);
        }
    }
    Some(input)
}
