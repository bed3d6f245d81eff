//! Line-oriented terminal I/O: answering interrupts and printing the split.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use serde_json::{Map, Value};
use tabsplit_core::{Itemization, round_cents};
use tabsplit_runtime::{FieldType, FormRequest, ResumeInput};
use tabsplit_runtime::stages::split_request::{NUM_PEOPLE_FIELD, PEOPLE_NAMES_FIELD};

/// Answers supplied on the command line.
///
/// Each one is used at most once. If the run rejects it, the user is asked
/// interactively instead.
#[derive(Clone, Debug, Default)]
pub struct Answers {
    /// Participant count.
    pub people: Option<u32>,
    /// Comma-separated participant names.
    pub names: Option<String>,
    /// Split instructions.
    pub instructions: Option<String>,
}

/// Prompts on `output`, reads answers from `input`.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    /// Wrap a reader and writer.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consume the terminal, returning the writer.
    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn ask(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label} ")?;
        self.output.flush()?;
        self.read_line()
    }

    fn print_error(&mut self, error: Option<&str>) -> io::Result<()> {
        if let Some(error) = error {
            writeln!(self.output, "! {error}")?;
        }
        Ok(())
    }

    /// Fill in a form, one field per line.
    pub fn answer_form(&mut self, form: &FormRequest, answers: &mut Answers) -> io::Result<ResumeInput> {
        self.print_error(form.error.as_deref())?;
        let mut values = Map::new();
        for field in &form.fields {
            let preset = match field.name.as_str() {
                NUM_PEOPLE_FIELD => answers.people.take().map(Value::from),
                PEOPLE_NAMES_FIELD => answers.names.take().map(Value::from),
                _ => None,
            };
            let value = match preset {
                Some(value) => value,
                None => {
                    let raw = self.ask(&field.label)?;
                    match field.field_type {
                        FieldType::Number => raw
                            .trim()
                            .parse::<u64>()
                            .map_or_else(|_| Value::String(raw), Value::from),
                        FieldType::Text => Value::String(raw),
                    }
                }
            };
            let _ = values.insert(field.name.clone(), value);
        }
        Ok(ResumeInput::Form(values))
    }

    /// Answer a free-text prompt.
    pub fn answer_prompt(
        &mut self,
        text: &str,
        error: Option<&str>,
        answers: &mut Answers,
    ) -> io::Result<ResumeInput> {
        if let Some(preset) = answers.instructions.take() {
            return Ok(ResumeInput::Text(preset));
        }
        writeln!(self.output, "\n{text}\n")?;
        self.print_error(error)?;
        Ok(ResumeInput::Text(self.ask(">")?))
    }
}

/// Plain-text rendering of the final split.
pub fn render_table(itemization: &Itemization) -> String {
    let mut out = String::new();
    for item in &itemization.item_breakdown {
        let _ = writeln!(out, "{:<28}{:>10}", item.item_name, money(item.item_price));
        for (person, amount) in &item.splits {
            let _ = writeln!(out, "  {person:<26}{:>10}", money(*amount));
        }
    }
    let _ = writeln!(out, "{}", "-".repeat(38));
    let _ = writeln!(out, "{:<28}{:>10}", "Subtotal", money(itemization.total_before_tax));
    let _ = writeln!(out, "{:<28}{:>10}", "Tax", money(itemization.total_tax));
    let _ = writeln!(out, "{}", "=".repeat(38));
    for (person, total) in &itemization.person_totals {
        let _ = writeln!(out, "{person:<28}{:>10}", money(*total));
    }
    let _ = writeln!(out, "{:<28}{:>10}", "Total", money(itemization.grand_total()));
    out
}

fn money(amount: f64) -> String {
    format!("${:.2}", round_cents(amount))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use indexmap::IndexMap;
    use tabsplit_core::ItemSplit;
    use tabsplit_runtime::FormField;

    use super::*;

    fn form(error: Option<&str>) -> FormRequest {
        FormRequest {
            fields: vec![
                FormField {
                    name: NUM_PEOPLE_FIELD.into(),
                    label: "How many?".into(),
                    field_type: FieldType::Number,
                    required: true,
                },
                FormField {
                    name: PEOPLE_NAMES_FIELD.into(),
                    label: "Names?".into(),
                    field_type: FieldType::Text,
                    required: true,
                },
            ],
            error: error.map(String::from),
        }
    }

    fn terminal(input: &str) -> Terminal<Cursor<Vec<u8>>, Vec<u8>> {
        Terminal::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    // ── forms ───────────────────────────────────────────────────────

    #[test]
    fn form_reads_one_line_per_field() {
        let mut term = terminal("2\nAlice, Bob\n");
        let input = term.answer_form(&form(None), &mut Answers::default()).unwrap();
        let ResumeInput::Form(values) = input else {
            panic!("expected form");
        };
        assert_eq!(values[NUM_PEOPLE_FIELD], 2);
        assert_eq!(values[PEOPLE_NAMES_FIELD], "Alice, Bob");
        let shown = String::from_utf8(term.into_output()).unwrap();
        assert!(shown.contains("How many? "));
        assert!(shown.contains("Names? "));
    }

    #[test]
    fn non_numeric_count_passed_through_as_text() {
        let mut term = terminal("two\nAlice\n");
        let ResumeInput::Form(values) = term.answer_form(&form(None), &mut Answers::default()).unwrap() else {
            panic!("expected form");
        };
        assert_eq!(values[NUM_PEOPLE_FIELD], "two");
    }

    #[test]
    fn presets_used_once_then_asked() {
        let mut answers = Answers {
            people: Some(3),
            names: Some("A, B, C".into()),
            instructions: None,
        };
        let mut term = terminal("2\nA, B\n");
        let ResumeInput::Form(first) = term.answer_form(&form(None), &mut answers).unwrap() else {
            panic!("expected form");
        };
        assert_eq!(first[NUM_PEOPLE_FIELD], 3);

        let ResumeInput::Form(second) = term.answer_form(&form(Some("bad")), &mut answers).unwrap() else {
            panic!("expected form");
        };
        assert_eq!(second[NUM_PEOPLE_FIELD], 2);
        assert_eq!(second[PEOPLE_NAMES_FIELD], "A, B");
        let shown = String::from_utf8(term.into_output()).unwrap();
        assert!(shown.contains("! bad"));
    }

    #[test]
    fn closed_input_is_eof() {
        let mut term = terminal("");
        let err = term.answer_form(&form(None), &mut Answers::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    // ── prompts ─────────────────────────────────────────────────────

    #[test]
    fn prompt_prints_text_and_reads_line() {
        let mut term = terminal("split evenly\r\n");
        let input = term
            .answer_prompt("How should we split?", Some("empty"), &mut Answers::default())
            .unwrap();
        assert_eq!(input, ResumeInput::text("split evenly"));
        let shown = String::from_utf8(term.into_output()).unwrap();
        assert!(shown.contains("How should we split?"));
        assert!(shown.contains("! empty"));
    }

    #[test]
    fn prompt_preset_skips_io() {
        let mut answers = Answers {
            instructions: Some("Alice pays".into()),
            ..Answers::default()
        };
        let mut term = terminal("");
        let input = term.answer_prompt("How?", None, &mut answers).unwrap();
        assert_eq!(input, ResumeInput::text("Alice pays"));
        assert!(answers.instructions.is_none());
        assert!(term.into_output().is_empty());
    }

    // ── table ───────────────────────────────────────────────────────

    #[test]
    fn table_lists_items_people_and_totals() {
        let mut splits = IndexMap::new();
        let _ = splits.insert("Alice".to_string(), 5.0);
        let mut person_totals = IndexMap::new();
        let _ = person_totals.insert("Alice".to_string(), 5.5);
        let itemization = Itemization {
            item_breakdown: vec![ItemSplit {
                item_name: "Coffee".into(),
                item_price: 5.0,
                splits,
            }],
            person_totals,
            total_before_tax: 5.0,
            total_tax: 0.5,
        };
        let table = render_table(&itemization);
        assert!(table.contains("Coffee"));
        assert!(table.contains("  Alice"));
        assert!(table.contains("$0.50"));
        assert!(table.lines().last().unwrap().ends_with("$5.50"));
    }
}
