//! The filter/window/group/position mini-language used by the find/search
//! family of commands.
//!
//! Two filter syntaxes are accepted, and may be mixed in one command:
//!
//! - legacy pairs (pre 0.21):   `find album "Flash Gordon"`
//! - expressions (post 0.21):   `find "((album == \"Flash Gordon\"))"`
//!
//! Expressions run through a small state machine (INIT → EXPR → OP → VAL →
//! FINI). Unqualified operators are promoted per command family (find is
//! case-sensitive, search case-insensitive and substring), a leading `!` is
//! folded into the operator, and every resolved expression is emitted as one
//! SQL condition with the user literal escaped. Garbage is dropped silently;
//! the parser never fails the command.

use tracing::{debug, warn};

use crate::mpd_protocol::Position;
use crate::mpd_protocol::tags::{TagKind, TagType, find_tagtype};

/// Option keywords a command hands to the parser / gets back from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Params(u8);

impl Params {
    pub const NONE: Params = Params(0);
    pub const WINDOW: Params = Params(1 << 0);
    pub const GROUP: Params = Params(1 << 1);
    pub const POSITION: Params = Params(1 << 2);
    pub const SORT: Params = Params(1 << 3);
    pub const FILTER: Params = Params(1 << 4);

    pub fn contains(self, other: Params) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Params {
    type Output = Params;

    fn bitor(self, rhs: Params) -> Params {
        Params(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Params {
    fn bitor_assign(&mut self, rhs: Params) {
        self.0 |= rhs.0;
    }
}

/// Query specification assembled by the parser: a WHERE condition of
/// AND-joined conjuncts plus sort/group/window clauses, ready to splice into
/// a SELECT. User literals are escaped at emission, never later.
#[derive(Debug, Default)]
pub struct QueryParams {
    pub filter: Option<String>,
    pub order: Option<String>,
    pub group: Option<String>,
    pub offset: i64,
    pub limit: Option<i64>,
}

impl QueryParams {
    pub fn push_condition(&mut self, condition: String) {
        match &mut self.filter {
            Some(filter) => {
                filter.push_str(" AND ");
                filter.push_str(&condition);
            }
            None => self.filter = Some(condition),
        }
    }

    pub fn append_group(&mut self, group_field: &str) {
        match &mut self.group {
            Some(group) => {
                group.push_str(", ");
                group.push_str(group_field);
            }
            None => self.group = Some(group_field.to_owned()),
        }
    }
}

/// Doubles single quotes so a user literal can sit inside a quoted SQL
/// string.
pub fn sql_escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[derive(Debug)]
pub struct CommandParams {
    allow: Params,
    pub seen: Params,
    pub qp: QueryParams,
    pub groups: Vec<&'static TagType>,
    /// When set, `group` arguments also extend the group-by clause.
    pub add_group_filter: bool,
    /// find-family commands match exactly, search-family by substring.
    pub exact_match: bool,
    /// Absolute queue position resolved from a `position` option.
    pub position: Option<i64>,
}

impl CommandParams {
    pub fn new(allow: Params) -> Self {
        CommandParams {
            allow,
            seen: Params::NONE,
            qp: QueryParams::default(),
            groups: Vec::new(),
            add_group_filter: false,
            exact_match: false,
            position: None,
        }
    }

    pub fn exact(allow: Params) -> Self {
        CommandParams {
            exact_match: true,
            ..Self::new(allow)
        }
    }

    /// Scans the argument tail of a command. Arguments before the first
    /// recognized option keyword are filter input; each option keyword
    /// consumes one following argument. Unknown or disallowed options are
    /// ignored and a missing mandatory option argument stops the scan, both
    /// without failing the command.
    ///
    /// `current_pos` is the queue position of the current song, used to
    /// resolve relative `position` arguments.
    pub fn parse_args(&mut self, args: &[String], current_pos: u32) {
        let mut filters_active = self.allow.contains(Params::FILTER);
        let mut i = 0;

        while i < args.len() {
            let arg = args[i].as_str();

            let param = if arg.eq_ignore_ascii_case("window") {
                Params::WINDOW
            } else if arg.eq_ignore_ascii_case("group") {
                Params::GROUP
            } else if arg.eq_ignore_ascii_case("position") {
                Params::POSITION
            } else if arg.eq_ignore_ascii_case("sort") {
                Params::SORT
            } else if filters_active {
                Params::FILTER
            } else {
                Params::NONE
            };

            // filters stop at the first option keyword
            if param != Params::FILTER {
                filters_active = false;
            }

            if !self.allow.contains(param) || param == Params::NONE {
                i += 2;
                continue;
            }

            if param != Params::FILTER && i + 1 >= args.len() {
                warn!("missing mandatory argument to parameter '{arg}'");
                break;
            }

            match param {
                Params::WINDOW => {
                    self.parse_window(&args[i + 1]);
                    i += 2;
                }
                Params::GROUP => {
                    self.parse_group(&args[i + 1]);
                    i += 2;
                }
                Params::POSITION => {
                    self.parse_position(&args[i + 1], current_pos);
                    i += 2;
                }
                Params::SORT => {
                    // accepted but unhandled
                    i += 2;
                }
                _ => {
                    let narg = args.get(i + 1).map(|s| s.as_str());
                    i += self.parse_filter(arg, narg);
                }
            }
        }
    }

    fn parse_window(&mut self, arg: &str) {
        match super::parse_range(arg) {
            Ok((start, end)) => {
                self.qp.offset = start;
                self.qp.limit = Some(end - start);
                self.seen |= Params::WINDOW;
            }
            Err(_) => {
                warn!("window argument doesn't convert to integer or range: '{arg}'");
            }
        }
    }

    fn parse_group(&mut self, arg: &str) {
        let Some(tagtype) = find_tagtype(arg) else {
            return;
        };
        if tagtype.kind == TagKind::Special {
            return;
        }

        if self.add_group_filter {
            self.qp.append_group(tagtype.group_field);
        }
        self.groups.push(tagtype);
        self.seen |= Params::GROUP;
    }

    fn parse_position(&mut self, arg: &str, current_pos: u32) {
        match Position::parse(arg) {
            Ok(pos) => {
                self.position = Some(pos.resolve(current_pos));
                self.seen |= Params::POSITION;
            }
            Err(_) => {
                warn!("position argument doesn't convert to integer: '{arg}'");
            }
        }
    }

    /// Handles one filter. Returns how many arguments were consumed (the
    /// expression form uses one, the legacy pair form two).
    fn parse_filter(&mut self, arg: &str, narg: Option<&str>) -> usize {
        if arg.starts_with('(') && arg.len() > 2 && arg.ends_with(')') {
            self.parse_expression(arg);
            return 1;
        }

        let Some(narg) = narg else {
            // a single trailing token is allowed when listing albums for an
            // artist (list album <artist>)
            self.push_condition(format!("(f.album_artist = '{}')", sql_escape(arg)));
            return 1;
        };

        let Some(tagtype) = find_tagtype(arg) else {
            warn!("parameter '{arg}' is not supported and will be ignored");
            return 1;
        };

        let condition = match tagtype.kind {
            TagKind::String => {
                if self.exact_match {
                    Some(format!("({} = '{}')", tagtype.field, sql_escape(narg)))
                } else {
                    Some(format!("({} LIKE '%{}%')", tagtype.field, sql_escape(narg)))
                }
            }
            TagKind::Int => match narg.parse::<u32>() {
                Ok(num) => Some(format!("({} = {num})", tagtype.field)),
                Err(_) => {
                    warn!("{} parameter '{narg}' is not an integer and will be ignored", tagtype.tag);
                    None
                }
            },
            TagKind::Special => self.legacy_special(tagtype, narg),
        };

        if let Some(condition) = condition {
            self.push_condition(condition);
        }
        2
    }

    fn legacy_special(&self, tagtype: &TagType, value: &str) -> Option<String> {
        let escaped = sql_escape(value);
        match tagtype.tag {
            "any" => Some(format!(
                "(f.artist LIKE '%{escaped}%' OR f.album LIKE '%{escaped}%' OR f.title LIKE '%{escaped}%')"
            )),
            "file" => {
                if self.exact_match {
                    Some(format!("(f.virtual_path LIKE '/{escaped}')"))
                } else {
                    Some(format!("(f.virtual_path LIKE '%{escaped}%')"))
                }
            }
            "base" => Some(format!("(f.virtual_path LIKE '/{escaped}%')")),
            "modified-since" => Some(modified_since_condition(value)),
            other => {
                warn!("unknown special parameter '{other}' will be ignored");
                None
            }
        }
    }

    fn push_condition(&mut self, condition: String) {
        self.qp.push_condition(condition);
        self.seen |= Params::FILTER;
    }

    /// `((TAG [OP] VALUE))` — the post-0.21 expression syntax. The double
    /// parenthesis show up with negation `(!(artist == "VAL"))` and
    /// conjunction `((artist == 'FOO') AND (album == 'BAR'))`; some clients
    /// send a single pair. Values must be parsed properly so a `)` inside a
    /// quoted value doesn't end the group.
    fn parse_expression(&mut self, arg: &str) {
        let bytes = arg.as_bytes();
        let mut end = bytes.len() - 1;
        let mut i = 1;
        let mut first = true;
        let mut negate = false;
        let mut state = State::Init;
        let mut tagtype: Option<&'static TagType> = None;
        let mut op = Op::None;

        while i < end {
            match state {
                State::Init => {
                    tagtype = None;
                    op = Op::None;
                    match bytes[i] {
                        b'!' => negate = true,
                        b'(' => state = State::Expr,
                        _ if first => {
                            // a single expression without the outer pair of
                            // parenthesis: pretend they were there
                            end = bytes.len();
                            state = State::Expr;
                            first = false;
                            continue;
                        }
                        _ => negate = false, // eat garbage we don't grok
                    }
                    first = false;
                    i += 1;
                }
                State::Expr => {
                    // TAG<space>
                    let Some(space) = find_byte(bytes, i, end, b' ') else {
                        state = State::Init;
                        i = end;
                        continue;
                    };
                    match find_tagtype(&arg[i..space]) {
                        None => {
                            warn!("tag '{}' is not supported, condition ignored", &arg[i..space]);
                            state = State::Init;
                        }
                        Some(t) => {
                            tagtype = Some(t);
                            // these expressions lack an operator, the
                            // meaning is special per tag
                            if t.tag == "base" || t.tag == "modified-since" {
                                op = Op::None;
                                state = State::Val;
                            } else {
                                state = State::Op;
                            }
                        }
                    }
                    i = space + 1;
                }
                State::Op => {
                    let Some(space) = find_byte(bytes, i, end, b' ') else {
                        state = State::Init;
                        i = end;
                        continue;
                    };
                    match Op::parse(&arg[i..space]) {
                        None => {
                            warn!("operator '{}' is not supported, condition ignored", &arg[i..space]);
                            state = State::Init;
                        }
                        Some(parsed) => {
                            let is_int = tagtype.is_some_and(|t| t.kind == TagKind::Int);
                            op = parsed.promote(self.exact_match, is_int);
                            if negate {
                                op = op.fold_negation();
                            }
                            state = State::Val;
                        }
                    }
                    i = space + 1;
                }
                State::Val => match bytes[i] {
                    b'0'..=b'9' => {
                        let Some(close) = find_byte(bytes, i, end, b')') else {
                            state = State::Init;
                            i = end;
                            continue;
                        };
                        let value = arg[i..close].to_owned();
                        self.finish_expression(tagtype, op, negate, &value);
                        negate = false;
                        state = State::Init;
                        i = close + 1;
                    }
                    quote @ (b'"' | b'\'') => {
                        let mut value = String::new();
                        let mut j = i + 1;
                        let mut closed = false;
                        while j < end {
                            match bytes[j] {
                                b if b == quote => {
                                    closed = true;
                                    break;
                                }
                                b'\\' if j + 1 < end => {
                                    // the backslash is removed, the escaped
                                    // character kept whole
                                    let Some(c) = arg[j + 1..].chars().next() else {
                                        break;
                                    };
                                    value.push(c);
                                    j += 1 + c.len_utf8();
                                }
                                _ => {
                                    let Some(c) = arg[j..].chars().next() else {
                                        break;
                                    };
                                    value.push(c);
                                    j += c.len_utf8();
                                }
                            }
                        }
                        if !closed {
                            state = State::Init;
                            i = end;
                            continue;
                        }
                        self.finish_expression(tagtype, op, negate, &value);
                        negate = false;
                        state = State::Init;
                        // step past the quote and the closing parenthesis
                        i = j + 1;
                        if i < end && bytes[i] == b')' {
                            i += 1;
                        }
                        while i < end && bytes[i] == b' ' {
                            i += 1;
                        }
                    }
                    _ => {
                        warn!("illegal value for expression: '{}'", &arg[i..end.min(arg.len())]);
                        state = State::Init;
                        i += 1;
                    }
                },
            }
        }
    }

    /// Emits one resolved expression as a SQL condition.
    fn finish_expression(
        &mut self,
        tagtype: Option<&'static TagType>,
        op: Op,
        negate: bool,
        value: &str,
    ) {
        let Some(tagtype) = tagtype else { return };
        debug!(tag = tagtype.tag, ?op, value, "filter expression");

        let condition = match tagtype.kind {
            TagKind::String => Some(op.condition(tagtype.field, value, negate)),
            TagKind::Int => match value.parse::<u32>() {
                Ok(num) => Some(op.int_condition(tagtype.field, num, negate)),
                Err(_) => {
                    warn!("{} parameter '{value}' is not an integer and will be ignored", tagtype.tag);
                    None
                }
            },
            TagKind::Special => match tagtype.tag {
                "any" => {
                    // the documentation says any checks *all* tag types, not
                    // just these three
                    Some(format!(
                        "({} OR {} OR {})",
                        op.condition("f.artist", value, negate),
                        op.condition("f.album", value, negate),
                        op.condition("f.title", value, negate)
                    ))
                }
                "file" => Some(op.condition("f.virtual_path", value, negate)),
                "base" => Some(format!("(f.virtual_path LIKE '/{}%')", sql_escape(value))),
                "modified-since" => Some(modified_since_condition(value)),
                other => {
                    warn!("unknown special parameter '{other}' will be ignored");
                    None
                }
            },
        };

        if let Some(condition) = condition {
            self.push_condition(condition);
        }
    }
}

/// The value is either a UNIX timestamp (no `-`) or an ISO-8601 string.
fn modified_since_condition(value: &str) -> String {
    let datefmt = if value.contains('-') { "utc" } else { "unixepoch" };
    format!(
        "(f.time_modified > strftime('%s', datetime('{}', '{datefmt}')))",
        sql_escape(value)
    )
}

fn find_byte(bytes: &[u8], from: usize, to: usize, needle: u8) -> Option<usize> {
    (from..to.min(bytes.len())).find(|&idx| bytes[idx] == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Expr,
    Op,
    Val,
}

/// Filter operators after parsing. CI/CS are case-insensitive and
/// case-sensitive; the unqualified forms only exist between parse and
/// promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    None,
    Greq,
    Equals,
    EqualsCi,
    EqualsCs,
    NotEquals,
    NotEqualsCi,
    NotEqualsCs,
    Contains,
    ContainsCi,
    ContainsCs,
    NotContains,
    NotContainsCi,
    NotContainsCs,
    StartsWith,
    StartsWithCi,
    StartsWithCs,
    NotStartsWith,
    NotStartsWithCi,
    NotStartsWithCs,
    Regex,
    NotRegex,
}

impl Op {
    fn parse(token: &str) -> Option<Op> {
        Some(match token {
            ">=" => Op::Greq,
            "==" => Op::Equals,
            "!=" => Op::NotEquals,
            "eq_cs" => Op::EqualsCs,
            "!eq_cs" => Op::NotEqualsCs,
            "eq_ci" => Op::EqualsCi,
            "!eq_ci" => Op::NotEqualsCi,
            "=~" => Op::Regex,
            "!~" => Op::NotRegex,
            "contains" => Op::Contains,
            "!contains" => Op::NotContains,
            "contains_cs" => Op::ContainsCs,
            "!contains_cs" => Op::NotContainsCs,
            "contains_ci" => Op::ContainsCi,
            "!contains_ci" => Op::NotContainsCi,
            "startswith" => Op::StartsWith,
            "!startswith" => Op::NotStartsWith,
            "startswith_cs" => Op::StartsWithCs,
            "!startswith_cs" => Op::NotStartsWithCs,
            "startswith_ci" => Op::StartsWithCi,
            "!startswith_ci" => Op::NotStartsWithCi,
            _ => return None,
        })
    }

    /// find commands are case-sensitive, the rest ignore case; promote the
    /// non-explicit operators accordingly (v0.24). Historically search used
    /// strstr where find used strcmp, so search also promotes equality to
    /// contains. Numbers are never promoted.
    fn promote(self, exact_match: bool, is_int: bool) -> Op {
        match self {
            Op::Equals | Op::NotEquals if is_int => self,
            Op::Equals => {
                if exact_match {
                    Op::EqualsCs
                } else {
                    Op::ContainsCi
                }
            }
            Op::NotEquals => {
                if exact_match {
                    Op::NotEqualsCs
                } else {
                    Op::NotContainsCi
                }
            }
            Op::Contains => {
                if exact_match {
                    Op::ContainsCs
                } else {
                    Op::ContainsCi
                }
            }
            Op::NotContains => {
                if exact_match {
                    Op::NotContainsCs
                } else {
                    Op::NotContainsCi
                }
            }
            Op::StartsWith => {
                if exact_match {
                    Op::StartsWithCs
                } else {
                    Op::StartsWithCi
                }
            }
            Op::NotStartsWith => {
                if exact_match {
                    Op::NotStartsWithCs
                } else {
                    Op::NotStartsWithCi
                }
            }
            other => other,
        }
    }

    /// Folds a leading `!` on the whole group into the operator so emission
    /// only deals with positive/negative pairs. `>=` keeps its negate flag
    /// and flips to `<` when emitted.
    fn fold_negation(self) -> Op {
        match self {
            Op::Equals => Op::NotEquals,
            Op::NotEquals => Op::Equals,
            Op::EqualsCi => Op::NotEqualsCi,
            Op::NotEqualsCi => Op::EqualsCi,
            Op::EqualsCs => Op::NotEqualsCs,
            Op::NotEqualsCs => Op::EqualsCs,
            Op::Contains => Op::NotContains,
            Op::NotContains => Op::Contains,
            Op::ContainsCi => Op::NotContainsCi,
            Op::NotContainsCi => Op::ContainsCi,
            Op::ContainsCs => Op::NotContainsCs,
            Op::NotContainsCs => Op::ContainsCs,
            Op::StartsWith => Op::NotStartsWith,
            Op::NotStartsWith => Op::StartsWith,
            Op::StartsWithCi => Op::NotStartsWithCi,
            Op::NotStartsWithCi => Op::StartsWithCi,
            Op::StartsWithCs => Op::NotStartsWithCs,
            Op::NotStartsWithCs => Op::StartsWithCs,
            Op::Regex => Op::NotRegex,
            Op::NotRegex => Op::Regex,
            other => other,
        }
    }

    /// SQL condition for a string-valued field. LIKE gives case-insensitive
    /// matching, GLOB and `=` case-sensitive.
    fn condition(self, field: &str, value: &str, negate: bool) -> String {
        let v = sql_escape(value);
        match self {
            Op::Greq if negate => format!("({field} < '{v}')"),
            Op::Greq => format!("({field} >= '{v}')"),
            Op::Equals | Op::EqualsCs => format!("({field} = '{v}')"),
            Op::NotEquals | Op::NotEqualsCs => format!("({field} != '{v}')"),
            Op::EqualsCi => format!("({field} LIKE '{v}')"),
            Op::NotEqualsCi => format!("({field} NOT LIKE '{v}')"),
            Op::Contains | Op::ContainsCs => format!("({field} GLOB '*{v}*')"),
            Op::NotContains | Op::NotContainsCs => format!("({field} NOT GLOB '*{v}*')"),
            Op::ContainsCi => format!("({field} LIKE '%{v}%')"),
            Op::NotContainsCi => format!("({field} NOT LIKE '%{v}%')"),
            Op::StartsWith | Op::StartsWithCs => format!("({field} GLOB '{v}*')"),
            Op::NotStartsWith | Op::NotStartsWithCs => format!("({field} NOT GLOB '{v}*')"),
            Op::StartsWithCi => format!("({field} LIKE '{v}%')"),
            Op::NotStartsWithCi => format!("({field} NOT LIKE '{v}%')"),
            Op::Regex => format!("({field} REGEXP '{v}')"),
            Op::NotRegex => format!("(NOT {field} REGEXP '{v}')"),
            Op::None => format!("({field} = '{v}')"),
        }
    }

    fn int_condition(self, field: &str, value: u32, negate: bool) -> String {
        match self {
            Op::Greq if negate => format!("({field} < {value})"),
            Op::Greq => format!("({field} >= {value})"),
            Op::NotEquals | Op::NotEqualsCi | Op::NotEqualsCs => format!("({field} != {value})"),
            _ => format!("({field} = {value})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(exact_match: bool, args: &[&str]) -> CommandParams {
        let allow = Params::FILTER | Params::WINDOW | Params::GROUP | Params::POSITION | Params::SORT;
        let mut params = if exact_match {
            CommandParams::exact(allow)
        } else {
            CommandParams::new(allow)
        };
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        params.parse_args(&args, 4);
        params
    }

    fn filter(exact_match: bool, args: &[&str]) -> String {
        parse(exact_match, args).qp.filter.unwrap_or_default()
    }

    #[test]
    fn legacy_pair_search_is_substring() {
        assert_eq!(
            filter(false, &["artist", "Bach"]),
            "(f.album_artist LIKE '%Bach%')"
        );
    }

    #[test]
    fn legacy_pair_find_is_exact() {
        assert_eq!(filter(true, &["artist", "Bach"]), "(f.album_artist = 'Bach')");
    }

    #[test]
    fn legacy_int_pair() {
        assert_eq!(filter(true, &["date", "1700"]), "(f.year = 1700)");
        // non-integer values are dropped, the command still runs
        assert_eq!(filter(true, &["date", "renaissance"]), "");
    }

    #[test]
    fn legacy_any_is_an_or_triplet() {
        assert_eq!(
            filter(false, &["any", "gordon"]),
            "(f.artist LIKE '%gordon%' OR f.album LIKE '%gordon%' OR f.title LIKE '%gordon%')"
        );
    }

    #[test]
    fn legacy_base_is_a_prefix_match() {
        assert_eq!(
            filter(false, &["base", "file:/srv/music"]),
            "(f.virtual_path LIKE '/file:/srv/music%')"
        );
    }

    #[test]
    fn modified_since_unix_and_iso() {
        assert_eq!(
            filter(false, &["modified-since", "1700000000"]),
            "(f.time_modified > strftime('%s', datetime('1700000000', 'unixepoch')))"
        );
        assert_eq!(
            filter(false, &["modified-since", "2024-01-01"]),
            "(f.time_modified > strftime('%s', datetime('2024-01-01', 'utc')))"
        );
    }

    #[test]
    fn expression_with_conjunction() {
        assert_eq!(
            filter(true, &[r#"((Artist == "Bach") AND (Date >= 1700))"#]),
            "(f.album_artist = 'Bach') AND (f.year >= 1700)"
        );
    }

    #[test]
    fn single_pair_of_parens_and_single_quotes() {
        // like Maximum MPD sends
        assert_eq!(
            filter(true, &["(Album == '12 Memories')"]),
            "(f.album = '12 Memories')"
        );
    }

    #[test]
    fn search_promotes_equals_to_contains() {
        assert_eq!(
            filter(false, &[r#"((Artist == "Bach"))"#]),
            "(f.album_artist LIKE '%Bach%')"
        );
        // but never for numbers
        assert_eq!(filter(false, &["((Date == 1700))"]), "(f.year = 1700)");
    }

    #[test]
    fn explicit_case_qualifiers_are_untouched() {
        assert_eq!(
            filter(false, &["((Artist eq_cs 'Bach'))"]),
            "(f.album_artist = 'Bach')"
        );
        assert_eq!(
            filter(true, &["((Artist contains_ci 'bach'))"]),
            "(f.album_artist LIKE '%bach%')"
        );
    }

    #[test]
    fn unqualified_contains_and_startswith_promote() {
        assert_eq!(
            filter(true, &["((Artist contains 'ach'))"]),
            "(f.album_artist GLOB '*ach*')"
        );
        assert_eq!(
            filter(false, &["((Artist startswith 'Ba'))"]),
            "(f.album_artist LIKE 'Ba%')"
        );
    }

    #[test]
    fn negated_group_folds_into_operator() {
        assert_eq!(
            filter(true, &[r#"(!(Artist == "Bach"))"#]),
            "(f.album_artist != 'Bach')"
        );
        assert_eq!(
            filter(true, &["(!(Artist startswith_ci 'ba'))"]),
            "(f.album_artist NOT LIKE 'ba%')"
        );
        assert_eq!(filter(true, &["(!(Date >= 1700))"]), "(f.year < 1700)");
    }

    #[test]
    fn regex_operators() {
        assert_eq!(
            filter(true, &["((Artist =~ 'B.*h'))"]),
            "(f.album_artist REGEXP 'B.*h')"
        );
        assert_eq!(
            filter(true, &["((Artist !~ 'B.*h'))"]),
            "(NOT f.album_artist REGEXP 'B.*h')"
        );
    }

    #[test]
    fn values_are_escaped() {
        assert_eq!(
            filter(true, &[r#"((Album == "O'Brien's \"Best\""))"#]),
            r#"(f.album = 'O''Brien''s "Best"')"#
        );
    }

    #[test]
    fn conditions_stay_balanced() {
        for exact in [false, true] {
            let f = filter(exact, &[
                r#"((Artist == "a(b") AND (Album != "c)d"))"#,
                "window",
                "0:5",
            ]);
            assert_eq!(
                f.matches('(').count(),
                f.matches(')').count(),
                "unbalanced: {f}"
            );
        }
    }

    #[test]
    fn garbage_expressions_are_dropped_silently() {
        assert_eq!(filter(true, &["((NoSuchTag == 'x'))"]), "");
        assert_eq!(filter(true, &["((Artist ~~~ 'x'))"]), "");
        // valid expression after garbage still lands
        assert_eq!(
            filter(true, &["((Artist ?? 'x') AND (Album == 'y'))"]),
            "(f.album = 'y')"
        );
    }

    #[test]
    fn base_expression_without_operator() {
        assert_eq!(
            filter(true, &["(base 'file:/srv/music')"]),
            "(f.virtual_path LIKE '/file:/srv/music%')"
        );
    }

    #[test]
    fn window_sets_offset_and_limit() {
        let params = parse(true, &["((Artist == 'x'))", "window", "3:8"]);
        assert_eq!(params.qp.offset, 3);
        assert_eq!(params.qp.limit, Some(5));
        assert!(params.seen.contains(Params::WINDOW));

        // a bare integer is the single-element window
        let params = parse(true, &["((Artist == 'x'))", "window", "7"]);
        assert_eq!(params.qp.offset, 7);
        assert_eq!(params.qp.limit, Some(1));
    }

    #[test]
    fn position_resolution() {
        // current position in these tests is 4
        assert_eq!(parse(true, &["position", "10"]).position, Some(10));
        assert_eq!(parse(true, &["position", "+0"]).position, Some(5));
        assert_eq!(parse(true, &["position", "-0"]).position, Some(4));
        assert_eq!(parse(true, &["position", "+2"]).position, Some(7));
        assert_eq!(parse(true, &["position", "-2"]).position, Some(2));
    }

    #[test]
    fn options_stop_filter_parsing() {
        let params = parse(false, &["artist", "Bach", "window", "0:2", "group", "Album"]);
        assert_eq!(
            params.qp.filter.as_deref(),
            Some("(f.album_artist LIKE '%Bach%')")
        );
        assert_eq!(params.groups.len(), 1);
        assert_eq!(params.groups[0].tag, "Album");
    }

    #[test]
    fn missing_option_argument_stops_the_scan() {
        let params = parse(false, &["artist", "Bach", "window"]);
        // the filter parsed before the option survives
        assert_eq!(
            params.qp.filter.as_deref(),
            Some("(f.album_artist LIKE '%Bach%')")
        );
        assert!(!params.seen.contains(Params::WINDOW));
    }

    #[test]
    fn group_ignores_special_tags() {
        let params = parse(true, &["group", "file"]);
        assert!(params.groups.is_empty());
        assert!(!params.seen.contains(Params::GROUP));
    }
}
