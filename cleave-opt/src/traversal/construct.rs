use super::Visitor;
use cleave_ir as ir;
use cleave_utils::CleaveResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;

#[derive(Clone)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// A number option.
    Num(i64),
    /// A string option.
    Str(String),
    /// A list of values.
    List(Vec<ParseVal>),
}

impl ParseVal {
    pub fn bool(&self) -> bool {
        let ParseVal::Bool(b) = self else {
            panic!("Expected bool, got {self}");
        };
        *b
    }

    pub fn num(&self) -> i64 {
        let ParseVal::Num(n) = self else {
            panic!("Expected number, got {self}");
        };
        *n
    }

    pub fn string(&self) -> String {
        let ParseVal::Str(s) = self else {
            panic!("Expected string, got {self}");
        };
        s.clone()
    }

    pub fn num_list(&self) -> Vec<i64> {
        match self {
            ParseVal::List(l) => {
                l.iter().map(ParseVal::num).collect::<Vec<_>>()
            }
            _ => panic!("Expected list of numbers, got {self}"),
        }
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
            ParseVal::Str(s) => write!(f, "{s}"),
            ParseVal::List(l) => {
                write!(f, "[")?;
                for (i, e) in l.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Option that can be passed to a pass.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    /// Parse a list using a parser for the elements.
    /// Returns `None` if any of the elements fail to parse.
    fn parse_list(
        s: &str,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Option<ParseVal> {
        let mut res = Vec::new();
        for e in s.split(',') {
            res.push(parse(e)?);
        }
        Some(ParseVal::List(res))
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    /// Parse a number from a string.
    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }

    /// Parse a list of numbers from a string.
    pub fn parse_num_list(s: &str) -> Option<ParseVal> {
        Self::parse_list(s, Self::parse_num)
    }

    /// Accept the string as given.
    pub fn parse_string(s: &str) -> Option<ParseVal> {
        Some(ParseVal::Str(s.to_string()))
    }
}

/// Trait that describes named things. Calling [`do_pass`](Visitor::do_pass)
/// and [`do_pass_default`](Visitor::do_pass_default) requires this to be
/// implemented.
///
/// This has to be a separate trait from [`Visitor`] because these methods
/// don't receive `self` which means that it is impossible to create dynamic
/// trait objects.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
    /// Set of options that can be passed to the pass.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Trait defining a method that can be used to construct a Visitor from a
/// [ir::Context]. This is useful when a pass needs to construct information
/// using the context *before* visiting the functions.
///
/// For passes that don't need to use the context, this trait can
/// automatically be derived from [Default].
pub trait ConstructVisitor {
    fn get_opts(ctx: &ir::Context) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let opts = Self::opts();
        let n = Self::name();
        let mut values: LinkedHashMap<&'static str, ParseVal> = ctx
            .extra_opts
            .iter()
            .filter_map(|opt| {
                // The format is either pass:opt or pass:opt=val
                let mut splits = opt.split(':');
                if let Some(pass) = splits.next() {
                    if pass == n {
                        let mut splits = splits.next()?.split('=');
                        let opt = splits.next()?.to_string();
                        let Some(opt) = opts.iter().find(|o| o.name == opt)
                        else {
                            log::warn!(
                                "Ignoring unknown option for pass `{n}`: {opt}"
                            );
                            return None;
                        };
                        let val = if let Some(v) = splits.next() {
                            let Some(v) = opt.parse(v) else {
                                log::warn!(
                                    "Ignoring invalid value for option `{n}:{}`: {v}",
                                    opt.name(),
                                );
                                return None;
                            };
                            v
                        } else {
                            ParseVal::Bool(true)
                        };
                        return Some((opt.name(), val));
                    }
                }
                None
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Extra options for {}: {}",
                Self::name(),
                values.iter().map(|(o, v)| format!("{o}->{v}")).join(", ")
            );
        }

        // For all options that were not provided with values, fill in the
        // defaults.
        for opt in opts {
            if !values.contains_key(opt.name()) {
                values.insert(opt.name(), opt.default.clone());
            }
        }

        values
    }

    /// Construct the visitor using information from the Context.
    fn from(_ctx: &ir::Context) -> CleaveResult<Self>
    where
        Self: Sized;

    /// Clear the data stored in the visitor. Called after a pass run
    /// completes so the visitor can be reused.
    fn clear_data(&mut self);
}

/// Derive ConstructVisitor when [Default] is provided for a visitor.
impl<T: Default + Sized + Visitor> ConstructVisitor for T {
    fn from(_ctx: &ir::Context) -> CleaveResult<Self> {
        Ok(T::default())
    }

    fn clear_data(&mut self) {
        *self = T::default();
    }
}
