use std::fmt::Display;

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, is_not, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1, satisfy};
use nom::combinator::{eof, map, map_res, not, opt, recognize, verify};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};

use crate::error::{QueryError, Result};
use crate::execution::plan::SortDirection;
use crate::execution::predicate::FilterOp;
use crate::types::{Value, ValueType};

const KEYWORDS: &[&str] = &[
    "SELECT", "DISTINCT", "FROM", "JOIN", "INNER", "ON", "WHERE", "AND", "NOT", "BETWEEN", "IN",
    "LIKE", "GROUP", "ORDER", "BY", "ASC", "DESC", "LIMIT", "TRUE", "FALSE", "INSERT", "INTO",
    "VALUES", "CREATE", "TABLE", "AS",
];

#[derive(Debug, PartialEq)]
pub enum ParseTree<'a> {
    Select(SelectParseTree<'a>),
    Insert(InsertParseTree<'a>),
    CreateTable(CreateTableParseTree<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParseAttribute<'a> {
    pub name: &'a str,
    pub binding: Option<&'a str>,
}

impl<'a> BoundParseAttribute<'a> {
    pub fn new_bound(binding: &'a str, name: &'a str) -> BoundParseAttribute<'a> {
        BoundParseAttribute { name, binding: Some(binding) }
    }

    pub fn new_unbound(name: &'a str) -> BoundParseAttribute<'a> {
        BoundParseAttribute { name, binding: None }
    }
}

impl Display for BoundParseAttribute<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(binding) = self.binding {
            write!(f, "{}.{}", binding, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParseTable<'a> {
    pub name: &'a str,
    pub binding: Option<&'a str>,
}

impl<'a> BoundParseTable<'a> {
    pub fn new_bound(name: &'a str, binding: &'a str) -> BoundParseTable<'a> {
        BoundParseTable { name, binding: Some(binding) }
    }

    pub fn new_unbound(name: &'a str) -> BoundParseTable<'a> {
        BoundParseTable { name, binding: None }
    }

    /// The name columns of this table are qualified with.
    pub fn binding_name(&self) -> &'a str {
        self.binding.unwrap_or(self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem<'a> {
    Column(BoundParseAttribute<'a>),
    Aggregate { function: &'a str, argument: BoundParseAttribute<'a> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParseTree<'a> {
    pub table: BoundParseTable<'a>,
    pub on: Vec<(BoundParseAttribute<'a>, BoundParseAttribute<'a>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOperand {
    Scalar(Value),
    List(Vec<Value>),
}

/// `column op operand`. A bare `flag` is read as `flag = TRUE` and `NOT flag` as `flag <> TRUE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWhereClause<'a> {
    pub column: BoundParseAttribute<'a>,
    pub op: FilterOp,
    pub operand: ParseOperand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectParseTree<'a> {
    pub distinct: bool,
    // None for SELECT *
    pub columns: Option<Vec<SelectItem<'a>>>,
    pub from_table: BoundParseTable<'a>,
    pub join: Option<JoinParseTree<'a>>,
    pub where_clause: Option<ParseWhereClause<'a>>,
    pub group_by: Vec<BoundParseAttribute<'a>>,
    pub order_by: Vec<(SelectItem<'a>, SortDirection)>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertParseTree<'a> {
    pub table: &'a str,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableParseTree<'a> {
    pub name: &'a str,
    pub columns: Vec<(&'a str, ValueType)>,
}

/// Parses one statement. Anything but whitespace and an optional `;` after it is an error.
pub fn parse_query(query: &str) -> Result<ParseTree> {
    let statement = terminated(
        with_optional_whitespace_padding(alt((parse_select, parse_insert, parse_create_table))),
        tuple((opt(char(';')), multispace0, eof)),
    )(query);
    match statement {
        Ok((_, parse_tree)) => Ok(parse_tree),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let near: String = e.input.chars().take(24).collect();
            if near.is_empty() {
                Err(QueryError::Parse("unexpected end of statement".to_string()))
            } else {
                Err(QueryError::Parse(format!("syntax error near '{}'", near)))
            }
        }
        Err(nom::Err::Incomplete(_)) => Err(QueryError::Parse("incomplete statement".to_string())),
    }
}

fn parse_select(rest_query: &str) -> IResult<&str, ParseTree> {
    let (rest_query, _) = keyword("SELECT")(rest_query)?;
    let (rest_query, distinct) = opt(with_optional_whitespace_padding(keyword("DISTINCT")))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, columns) = alt((parse_sql_star, parse_select_list))(rest_query)?;
    let (rest_query, _) = keyword("FROM")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, from_table) = parse_sql_bound_table(rest_query)?;
    let (rest_query, join) = opt(parse_join)(rest_query)?;
    let (rest_query, where_clause) = opt(parse_where_and_where_clause)(rest_query)?;
    let (rest_query, group_by) = opt(parse_group_by)(rest_query)?;
    let (rest_query, order_by) = opt(parse_order_by)(rest_query)?;
    let (rest_query, limit) = opt(parse_limit)(rest_query)?;
    Ok((rest_query, ParseTree::Select(SelectParseTree {
        distinct: distinct.is_some(),
        columns,
        from_table,
        join,
        where_clause,
        group_by: group_by.unwrap_or_default(),
        order_by: order_by.unwrap_or_default(),
        limit,
    })))
}

fn parse_sql_star(rest_query: &str) -> IResult<&str, Option<Vec<SelectItem>>> {
    let (rest_query, _) = tag("*")(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, None))
}

fn parse_select_list(rest_query: &str) -> IResult<&str, Option<Vec<SelectItem>>> {
    let (rest_query, list) = separated_list1(parse_sql_list_separator, parse_select_item)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, Some(list)))
}

fn parse_select_item(rest_query: &str) -> IResult<&str, SelectItem> {
    alt((parse_aggregate_item, map(parse_sql_bound_attribute, SelectItem::Column)))(rest_query)
}

fn parse_aggregate_item(rest_query: &str) -> IResult<&str, SelectItem> {
    let (rest_query, function) = parse_sql_identifier(rest_query)?;
    let (rest_query, argument) = delimited(
        with_optional_whitespace_padding(char('(')),
        parse_sql_bound_attribute,
        with_optional_whitespace_padding(char(')')),
    )(rest_query)?;
    Ok((rest_query, SelectItem::Aggregate { function, argument }))
}

fn parse_sql_bound_attribute(rest_query: &str) -> IResult<&str, BoundParseAttribute> {
    let (rest_query, elem1) = parse_sql_identifier(rest_query)?;
    let (rest_query, elem2) = opt(preceded(tag("."), parse_sql_identifier))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    if let Some(name) = elem2 {
        Ok((rest_query, BoundParseAttribute { name, binding: Some(elem1) }))
    } else {
        Ok((rest_query, BoundParseAttribute { name: elem1, binding: None }))
    }
}

fn parse_sql_bound_table(rest_query: &str) -> IResult<&str, BoundParseTable> {
    let (rest_query, name) = parse_sql_identifier(rest_query)?;
    let (rest_query, binding) = opt(preceded(
        pair(multispace1, opt(pair(keyword("AS"), multispace1))),
        parse_sql_identifier,
    ))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, BoundParseTable { name, binding }))
}

fn parse_join(rest_query: &str) -> IResult<&str, JoinParseTree> {
    let (rest_query, _) = opt(pair(keyword("INNER"), multispace1))(rest_query)?;
    let (rest_query, _) = keyword("JOIN")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, table) = parse_sql_bound_table(rest_query)?;
    let (rest_query, _) = keyword("ON")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, on) = separated_list1(
        with_optional_whitespace_padding(keyword("AND")),
        parse_join_condition,
    )(rest_query)?;
    Ok((rest_query, JoinParseTree { table, on }))
}

fn parse_join_condition(rest_query: &str) -> IResult<&str, (BoundParseAttribute, BoundParseAttribute)> {
    let (rest_query, left) = parse_sql_bound_attribute(rest_query)?;
    let (rest_query, _) = with_optional_whitespace_padding(char('='))(rest_query)?;
    let (rest_query, right) = parse_sql_bound_attribute(rest_query)?;
    Ok((rest_query, (left, right)))
}

fn parse_where_and_where_clause(rest_query: &str) -> IResult<&str, ParseWhereClause> {
    let (rest_query, _) = keyword("WHERE")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    alt((parse_negated_flag, parse_predicate))(rest_query)
}

fn parse_negated_flag(rest_query: &str) -> IResult<&str, ParseWhereClause> {
    let (rest_query, _) = keyword("NOT")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, column) = parse_sql_bound_attribute(rest_query)?;
    Ok((rest_query, ParseWhereClause { column, op: FilterOp::NotEq, operand: ParseOperand::Scalar(Value::Bool(true)) }))
}

fn parse_predicate(rest_query: &str) -> IResult<&str, ParseWhereClause> {
    let (rest_query, column) = parse_sql_bound_attribute(rest_query)?;
    let (rest_query, condition) = opt(alt((
        parse_between_condition,
        parse_in_condition,
        parse_like_condition,
        parse_comparison_condition,
    )))(rest_query)?;
    let (op, operand) = condition.unwrap_or((FilterOp::Eq, ParseOperand::Scalar(Value::Bool(true))));
    Ok((rest_query, ParseWhereClause { column, op, operand }))
}

fn parse_between_condition(rest_query: &str) -> IResult<&str, (FilterOp, ParseOperand)> {
    let (rest_query, _) = keyword("BETWEEN")(rest_query)?;
    let (rest_query, low) = with_optional_whitespace_padding(parse_value)(rest_query)?;
    let (rest_query, _) = keyword("AND")(rest_query)?;
    let (rest_query, high) = with_optional_whitespace_padding(parse_value)(rest_query)?;
    Ok((rest_query, (FilterOp::Between, ParseOperand::List(vec![low, high]))))
}

fn parse_in_condition(rest_query: &str) -> IResult<&str, (FilterOp, ParseOperand)> {
    let (rest_query, _) = keyword("IN")(rest_query)?;
    let (rest_query, values) = parse_value_list(rest_query)?;
    Ok((rest_query, (FilterOp::In, ParseOperand::List(values))))
}

fn parse_like_condition(rest_query: &str) -> IResult<&str, (FilterOp, ParseOperand)> {
    let (rest_query, _) = keyword("LIKE")(rest_query)?;
    let (rest_query, pattern) = with_optional_whitespace_padding(parse_string_value)(rest_query)?;
    Ok((rest_query, (FilterOp::Like, ParseOperand::Scalar(pattern))))
}

fn parse_comparison_condition(rest_query: &str) -> IResult<&str, (FilterOp, ParseOperand)> {
    let (rest_query, op) = map_res(parse_comp_operator, str::parse::<FilterOp>)(rest_query)?;
    let (rest_query, value) = with_optional_whitespace_padding(parse_value)(rest_query)?;
    Ok((rest_query, (op, ParseOperand::Scalar(value))))
}

fn parse_comp_operator(rest_query: &str) -> IResult<&str, &str> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, operator) = alt((
        tag("<="), tag(">="), tag("<>"), tag("!="), tag("="), tag("<"), tag(">")))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, operator))
}

fn parse_group_by(rest_query: &str) -> IResult<&str, Vec<BoundParseAttribute>> {
    let (rest_query, _) = tuple((keyword("GROUP"), multispace1, keyword("BY"), multispace1))(rest_query)?;
    separated_list1(parse_sql_list_separator, parse_sql_bound_attribute)(rest_query)
}

fn parse_order_by(rest_query: &str) -> IResult<&str, Vec<(SelectItem, SortDirection)>> {
    let (rest_query, _) = tuple((keyword("ORDER"), multispace1, keyword("BY"), multispace1))(rest_query)?;
    separated_list1(parse_sql_list_separator, parse_order_by_item)(rest_query)
}

fn parse_order_by_item(rest_query: &str) -> IResult<&str, (SelectItem, SortDirection)> {
    let (rest_query, item) = parse_select_item(rest_query)?;
    let (rest_query, direction) = opt(alt((
        map(keyword("ASC"), |_| SortDirection::Asc),
        map(keyword("DESC"), |_| SortDirection::Desc),
    )))(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, (item, direction.unwrap_or_default())))
}

fn parse_limit(rest_query: &str) -> IResult<&str, usize> {
    let (rest_query, _) = keyword("LIMIT")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, limit) = map_res(digit1, str::parse::<usize>)(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, limit))
}

fn parse_insert(rest_query: &str) -> IResult<&str, ParseTree> {
    let (rest_query, _) = keyword("INSERT")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, _) = keyword("INTO")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, table) = parse_sql_identifier(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, _) = keyword("VALUES")(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, rows) = separated_list1(parse_sql_list_separator, parse_value_list)(rest_query)?;
    Ok((rest_query, ParseTree::Insert(InsertParseTree { table, rows })))
}

fn parse_create_table(rest_query: &str) -> IResult<&str, ParseTree> {
    let (rest_query, _) = keyword("CREATE")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, _) = keyword("TABLE")(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, name) = parse_sql_identifier(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, columns) = delimited(
        char('('),
        separated_list1(char(','), with_optional_whitespace_padding(parse_column_definition)),
        char(')'),
    )(rest_query)?;
    Ok((rest_query, ParseTree::CreateTable(CreateTableParseTree { name, columns })))
}

fn parse_column_definition(rest_query: &str) -> IResult<&str, (&str, ValueType)> {
    let (rest_query, name) = parse_sql_identifier(rest_query)?;
    let (rest_query, _) = multispace1(rest_query)?;
    let (rest_query, column_type) = parse_sql_type(rest_query)?;
    Ok((rest_query, (name, column_type)))
}

fn parse_sql_type(rest_query: &str) -> IResult<&str, ValueType> {
    alt((
        map(alt((keyword("BIGINT"), keyword("INTEGER"), keyword("INT"))), |_| ValueType::Int),
        map(alt((keyword("DOUBLE"), keyword("FLOAT"), keyword("REAL"))), |_| ValueType::Float),
        map(alt((keyword("BOOLEAN"), keyword("BOOL"))), |_| ValueType::Bool),
        map(keyword("TEXT"), |_| ValueType::Text),
        map(tuple((
            keyword("VARCHAR"),
            opt(delimited(
                with_optional_whitespace_padding(char('(')),
                digit1,
                with_optional_whitespace_padding(char(')')),
            )),
        )), |_| ValueType::Text),
    ))(rest_query)
}

fn parse_value_list(rest_query: &str) -> IResult<&str, Vec<Value>> {
    delimited(
        with_optional_whitespace_padding(char('(')),
        separated_list1(parse_sql_list_separator, parse_value),
        with_optional_whitespace_padding(char(')')),
    )(rest_query)
}

fn parse_value(rest_query: &str) -> IResult<&str, Value> {
    alt((
        parse_string_value,
        map(keyword("TRUE"), |_| Value::Bool(true)),
        map(keyword("FALSE"), |_| Value::Bool(false)),
        parse_number_value,
    ))(rest_query)
}

// Single quoted, a doubled quote stands for one quote
fn parse_string_value(rest_query: &str) -> IResult<&str, Value> {
    let (rest_query, parts) = delimited(
        char('\''),
        many0(alt((is_not("'"), map(tag("''"), |_| "'")))),
        char('\''),
    )(rest_query)?;
    Ok((rest_query, Value::Text(parts.concat())))
}

fn parse_number_value(rest_query: &str) -> IResult<&str, Value> {
    let (rest_query, number) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(rest_query)?;
    let value = if number.contains('.') {
        number.parse::<f64>().map(Value::Float).ok()
    } else {
        number.parse::<i64>().map(Value::Int).ok()
    };
    match value {
        Some(value) => Ok((rest_query, value)),
        None => Err(nom::Err::Error(nom::error::Error::new(number, nom::error::ErrorKind::Digit))),
    }
}

fn parse_sql_list_separator(rest_query: &str) -> IResult<&str, &str> {
    let (rest_query, _) = multispace0(rest_query)?;
    let (rest_query, separator) = tag(",")(rest_query)?;
    let (rest_query, _) = multispace0(rest_query)?;
    Ok((rest_query, separator))
}

fn is_sql_identifier_char(char: char) -> bool {
    char.is_ascii_alphanumeric() || char == '_'
}

fn parse_sql_identifier(rest_query: &str) -> IResult<&str, &str> {
    verify(take_while1(is_sql_identifier_char), |identifier: &str| {
        !identifier.starts_with(|c: char| c.is_ascii_digit())
            && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(identifier))
    })(rest_query)
}

// A keyword only matches as a whole word, `FROM` is no prefix of `FROMAGE`
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(word), not(satisfy(is_sql_identifier_char)))
}

fn with_optional_whitespace_padding<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
    where F: FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, parser, multispace0)
}
