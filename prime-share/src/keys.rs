use std::io::BufRead;

/// What one line of operator input asks the producer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	/// Share a buffer and scan out a frame.
	Create,
	Quit,
	/// A single key with no meaning; prompt again.
	Ignored(char),
}

impl Command {
	/// Only single-key lines are commands. An empty line or anything longer
	/// ends the session, as does `q`.
	pub fn parse(line: &str) -> Self {
		let line = line.trim_end_matches(['\n', '\r']);
		let mut chars = line.chars();
		match (chars.next(), chars.next()) {
			(Some('c'), None) => Command::Create,
			(Some('q'), None) | (None, _) | (Some(_), Some(_)) => Command::Quit,
			(Some(other), None) => Command::Ignored(other),
		}
	}
}

pub const PROMPT: &str = "Press 'c' to create a buffer to be sent, 'Enter' or 'q' to quit";

/// Line-oriented key reader over any buffered input.
pub struct KeyReader<R> {
	input: R,
	line: String,
}

impl<R: BufRead> KeyReader<R> {
	pub fn new(input: R) -> Self {
		Self {
			input,
			line: String::new(),
		}
	}

	/// Next command, `Quit` once the input is exhausted.
	pub fn next_command(&mut self) -> std::io::Result<Command> {
		self.line.clear();
		if self.input.read_line(&mut self.line)? == 0 {
			return Ok(Command::Quit);
		}
		Ok(Command::parse(&self.line))
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	#[test]
	fn single_keys_map_to_commands() {
		assert_eq!(Command::parse("c\n"), Command::Create);
		assert_eq!(Command::parse("q\n"), Command::Quit);
		assert_eq!(Command::parse("x\n"), Command::Ignored('x'));
	}

	#[test]
	fn empty_and_long_lines_quit() {
		assert_eq!(Command::parse("\n"), Command::Quit);
		assert_eq!(Command::parse("create\n"), Command::Quit);
	}

	#[test]
	fn reader_stops_at_end_of_input() {
		let mut keys = KeyReader::new(Cursor::new("c\nz\nc\r\n"));
		assert_eq!(keys.next_command().unwrap(), Command::Create);
		assert_eq!(keys.next_command().unwrap(), Command::Ignored('z'));
		assert_eq!(keys.next_command().unwrap(), Command::Create);
		assert_eq!(keys.next_command().unwrap(), Command::Quit);
	}
}
