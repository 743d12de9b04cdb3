use crate::Value;

const PLACEHOLDER: char = '?';

/// Counts the positional placeholders of a SQL template.
pub(crate) fn count_placeholders(template: &str) -> usize {
    template.matches(PLACEHOLDER).count()
}

/// Replaces the placeholders of `template`, left to right, with the textual
/// form of `args`.
///
/// Placeholders without an argument are kept; extra arguments are ignored.
/// Text coming from an argument is never scanned for further placeholders.
pub(crate) fn substitute(template: &str, args: &[Value]) -> String {
    if args.is_empty() {
        return template.to_owned();
    }

    let mut args = args.iter();
    let mut sql = String::with_capacity(template.len());
    for c in template.chars() {
        if c != PLACEHOLDER {
            sql.push(c);
            continue;
        }
        match args.next() {
            Some(arg) => sql.push_str(&arg.to_string()),
            None => sql.push(c),
        }
    }
    sql
}
