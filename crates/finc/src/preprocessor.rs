use std::collections::HashMap;

use regex::Regex;

struct MacroDef {
    params: Vec<String>,
    body: String,
    is_function_like: bool,
}

/// Text-level pass that runs before the lexer: `#cdef` substitutions and
/// `#c_ifdef` conditional sections. Directive lines and disabled sections are
/// replaced by blank lines so spans keep pointing at the right source lines.
pub struct Preprocessor {
    defines: HashMap<String, MacroDef>,
    if_stack: Vec<bool>,
    cdef_re: Regex,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            defines: HashMap::new(),
            if_stack: Vec::new(),
            cdef_re: Regex::new(r"^#cdef\s+(\w+)(\(([^)]*)\))?\s*(.*)$").unwrap(),
        }
    }

    fn active(&self) -> bool {
        self.if_stack.iter().all(|&b| b)
    }

    pub fn process(&mut self, source: &str) -> String {
        let mut result = String::with_capacity(source.len());
        let mut pending = String::new();
        let mut in_continuation = false;

        for raw_line in source.lines() {
            let mut line = raw_line.to_string();

            if let Some(stripped) = line.strip_suffix('\\') {
                pending.push_str(stripped);
                in_continuation = true;
                result.push('\n');
                continue;
            }
            if in_continuation {
                pending.push_str(&line);
                line = std::mem::take(&mut pending);
                in_continuation = false;
            }

            let trimmed = line.trim();

            if trimmed.starts_with("#cdef") {
                if self.active() {
                    self.parse_define(&line);
                }
                result.push('\n');
                continue;
            }
            if let Some(name) = trimmed.strip_prefix("#c_ifdef") {
                let defined = self.defines.contains_key(name.trim());
                let enabled = self.active() && defined;
                self.if_stack.push(enabled);
                result.push('\n');
                continue;
            }
            if trimmed.starts_with("#c_else") {
                if let Some(last) = self.if_stack.pop() {
                    let enabled = self.active() && !last;
                    self.if_stack.push(enabled);
                }
                result.push('\n');
                continue;
            }
            if trimmed.starts_with("#c_endif") {
                self.if_stack.pop();
                result.push('\n');
                continue;
            }

            if self.active() {
                result.push_str(&self.expand_line(line));
            }
            result.push('\n');
        }

        result
    }

    fn parse_define(&mut self, line: &str) {
        let trimmed = line.trim();
        let Some(caps) = self.cdef_re.captures(trimmed) else {
            return;
        };
        let name = caps[1].to_string();
        let is_function_like = caps.get(2).is_some();
        let params = caps
            .get(3)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let body = caps.get(4).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        self.defines.insert(
            name,
            MacroDef {
                params,
                body,
                is_function_like,
            },
        );
    }

    fn expand_line(&self, mut line: String) -> String {
        // Capped so a macro that produces its own name cannot loop forever.
        let mut iterations = 100;
        loop {
            let (expanded, changed) = self.expand_once(&line);
            line = expanded;
            iterations -= 1;
            if !changed || iterations == 0 {
                return line;
            }
        }
    }

    fn expand_once(&self, line: &str) -> (String, bool) {
        let mut out = String::with_capacity(line.len());
        let mut changed = false;
        let mut i = 0usize;

        while i < line.len() {
            let c = line[i..].chars().next().unwrap();

            // Keep string and character literals intact.
            if c == '"' || c == '\'' {
                let quote = c;
                out.push(c);
                i += c.len_utf8();
                while i < line.len() {
                    let ch = line[i..].chars().next().unwrap();
                    out.push(ch);
                    i += ch.len_utf8();
                    if ch == '\\' && i < line.len() {
                        let esc = line[i..].chars().next().unwrap();
                        out.push(esc);
                        i += esc.len_utf8();
                        continue;
                    }
                    if ch == quote {
                        break;
                    }
                }
                continue;
            }

            if is_ident_start(c) {
                let start = i;
                while i < line.len() {
                    let ch = line[i..].chars().next().unwrap();
                    if is_ident_part(ch) {
                        i += ch.len_utf8();
                    } else {
                        break;
                    }
                }
                let word = &line[start..i];

                if let Some(def) = self.defines.get(word) {
                    if def.is_function_like {
                        let mut j = i;
                        while j < line.len() {
                            let ch = line[j..].chars().next().unwrap();
                            if ch.is_whitespace() {
                                j += ch.len_utf8();
                            } else {
                                break;
                            }
                        }
                        if line[j..].starts_with('(') {
                            if let Some((args, after)) = parse_args(line, j + 1) {
                                if args.len() == def.params.len() {
                                    out.push_str(&substitute_params(&def.body, &def.params, &args));
                                    i = after;
                                    changed = true;
                                    continue;
                                }
                            }
                        }
                    } else {
                        out.push_str(&def.body);
                        changed = true;
                        continue;
                    }
                }
                out.push_str(word);
                continue;
            }

            out.push(c);
            i += c.len_utf8();
        }

        (out, changed)
    }
}

fn parse_args(line: &str, mut i: usize) -> Option<(Vec<String>, usize)> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 1;

    while i < line.len() {
        let c = line[i..].chars().next().unwrap();
        if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
            if depth == 0 {
                break;
            }
        }
        if c == ',' && depth == 1 {
            args.push(current.trim().to_string());
            current.clear();
            i += c.len_utf8();
            continue;
        }
        current.push(c);
        i += c.len_utf8();
    }

    if depth != 0 {
        return None;
    }
    args.push(current.trim().to_string());
    Some((args, i + 1))
}

fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let mut expansion = body.to_string();
    for (param, arg) in params.iter().zip(args.iter()) {
        let re = Regex::new(&format!(r"\b{}\b", regex::escape(param))).unwrap();
        expansion = re
            .replace_all(&expansion, regex::NoExpand(arg.as_str()))
            .into_owned();
    }
    expansion
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
