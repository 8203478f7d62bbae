//! Small nom grammars for the statement heads the chunker splits on.
//!
//! ```text
//! INSERT [OVERWRITE] [INTO] TABLE <target>  SELECT|WITH ...
//! ALTER VIEW <name> AS                       SELECT|WITH ...
//! <ident> AS (                               -- one CTE binding
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{not, opt, peek, recognize},
    sequence::{pair, terminated, tuple},
    IResult,
};

/// A statement split into its head clause and the query body after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadSplit<'a> {
    /// The head clause, e.g. `INSERT OVERWRITE TABLE db.t`.
    pub head: &'a str,
    /// The table or view named by the head.
    pub target: &'a str,
    /// Everything from the body keyword onwards.
    pub body: &'a str,
}

/// A CTE binding head `<ident> AS (`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CteHead<'a> {
    pub name: &'a str,
    /// Offset of the opening parenthesis within the scanned input.
    pub open: usize,
}

/// Split `INSERT [OVERWRITE] [INTO] TABLE <target>` from its SELECT/WITH body.
pub fn split_insert(input: &str) -> Option<HeadSplit<'_>> {
    let input = input.trim_start();
    let (rest, (head, target)) = insert_head(input).ok()?;
    let (body, _) = multispace1::<_, nom::error::Error<&str>>(rest).ok()?;
    body_keyword(body).ok()?;
    Some(HeadSplit { head, target, body })
}

/// Split `ALTER VIEW <name> AS` from its SELECT/WITH body.
pub fn split_alter_view(input: &str) -> Option<HeadSplit<'_>> {
    let input = input.trim_start();
    let (rest, (head, target)) = alter_view_head(input).ok()?;
    let (body, _) = multispace1::<_, nom::error::Error<&str>>(rest).ok()?;
    body_keyword(body).ok()?;
    Some(HeadSplit { head, target, body })
}

/// Match `<ident> AS (` at the start of `input`, allowing leading whitespace.
pub fn cte_head(input: &str) -> Option<CteHead<'_>> {
    let (rest, name) = cte_binding(input).ok()?;
    Some(CteHead {
        name,
        open: input.len() - rest.len(),
    })
}

/// Target named by an `INSERT ... TABLE <target>` head, without backticks.
pub fn insert_target(head: &str) -> Option<&str> {
    insert_head(head.trim_start())
        .ok()
        .map(|(_, (_, target))| target.trim_matches('`'))
}

/// View named by an `ALTER VIEW <name> AS` head, without backticks.
pub fn alter_view_target(head: &str) -> Option<&str> {
    alter_view_head(head.trim_start())
        .ok()
        .map(|(_, (_, target))| target.trim_matches('`'))
}

fn insert_head(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, (head, target)) = consumed_with(
        tuple((
            keyword("INSERT"),
            opt(keyword("OVERWRITE")),
            opt(keyword("INTO")),
            keyword("TABLE"),
        )),
        object_name,
    )(input)?;
    Ok((rest, (head, target)))
}

fn alter_view_head(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, head) = recognize(tuple((
        keyword("ALTER"),
        keyword("VIEW"),
        object_name,
        multispace1,
        tag_no_case("AS"),
        peek(not(satisfy(is_ident_char))),
    )))(input)?;
    let (_, target) = object_name(after_keywords(head, 2))?;
    Ok((rest, (head, target)))
}

fn cte_binding(input: &str) -> IResult<&str, &str> {
    let (input, _) = multispace0(input)?;
    let (input, name) = take_while1(is_ident_char)(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("AS")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = peek(char('('))(input)?;
    Ok((input, name))
}

/// `SELECT` or `WITH` standing as a whole word.
fn body_keyword(input: &str) -> IResult<&str, &str> {
    peek(terminated(
        alt((tag_no_case("SELECT"), tag_no_case("WITH"))),
        not(satisfy(is_ident_char)),
    ))(input)
}

/// A keyword followed by at least one whitespace character.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| terminated(tag_no_case(kw), multispace1)(input)
}

/// Any run of non-whitespace, e.g. `db.t` or `` `db`.`t` ``.
fn object_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// Run `prefix` then `item`, returning the full consumed text and `item`'s
/// output.
fn consumed_with<'a, P, O>(
    mut prefix: P,
    mut item: impl FnMut(&'a str) -> IResult<&'a str, &'a str>,
) -> impl FnMut(&'a str) -> IResult<&'a str, (&'a str, &'a str)>
where
    P: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (rest, _) = prefix(input)?;
        let (rest, value) = item(rest)?;
        let consumed = &input[..input.len() - rest.len()];
        Ok((rest, (consumed, value)))
    }
}

/// Skip `n` whitespace-separated keywords.
fn after_keywords(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        let parsed: IResult<&str, _> =
            pair(take_while1(|c: char| !c.is_whitespace()), multispace1)(rest);
        match parsed {
            Ok((r, _)) => rest = r,
            Err(_) => break,
        }
    }
    rest
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
