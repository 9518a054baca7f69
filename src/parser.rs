//! トークン分割: 引数ベクタから `;` 区切りのパイプライン列を構築する。
//!
//! 入力は文字列の再パースではなく、プロセスの引数ベクタそのもの。
//! `;`（パイプライン区切り）と `|`（ステージ区切り）だけが特別な意味を持ち、
//! 他のトークンはすべてリテラル引数として扱う。共有カーソルは単調に進む
//! のみで、巻き戻しはしない。
//!
//! セパレータの誤用（先頭セパレータ、連続セパレータ、末尾セパレータ）は
//! すべて空セグメントに帰着し、パースエラー = 全体中断となる。

// ── AST ─────────────────────────────────────────────────────────────

/// 単一コマンド。先頭要素がプログラム名またはビルトイン名。
///
/// 不変条件: `args` は空でない（パーサーが保証する）。
/// exec が要求する NUL 終端の引数配列は起動時に executor 側で構築する。
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<String>,
}

/// パイプラインで接続されたコマンド列。`a | b | c` → 3 ステージ。
///
/// ステージ i の隣接はインデックス i-1 / i+1 で辿る。
/// 単段パイプラインにはパイプが 1 本も作られない。
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。いずれも致命的（呼び出し全体の中断）。
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    /// セパレータの直前にコマンドがない（先頭 `;` / `|`、`;;` 等）。
    #[error("empty command segment")]
    EmptySegment,
    /// セパレータの後にコマンドが続かない（末尾 `;` / `|`）。
    #[error("trailing separator")]
    TrailingSeparator,
}

// ── Tokenizer / Segmenter ───────────────────────────────────────────

/// `;` / `|` のセパレータ判定。
fn is_separator(token: &str) -> bool {
    token == ";" || token == "|"
}

/// カーソル位置から次のセパレータ（または列末尾）までのトークン数を返す。
///
/// 前提: `from <= tokens.len()`。トークン列は変更しない。
pub fn segment_len(tokens: &[String], from: usize) -> usize {
    tokens[from..]
        .iter()
        .take_while(|t| !is_separator(t))
        .count()
}

// ── Command Builder ─────────────────────────────────────────────────

/// 1 セグメントを消費して [`Command`] を構築する。
///
/// カーソルは消費したトークンの直後（セパレータの手前）まで進む。
/// 長さ 0 のセグメントは [`ParseError::EmptySegment`]。
pub fn parse_command(tokens: &[String], cursor: &mut usize) -> Result<Command, ParseError> {
    let len = segment_len(tokens, *cursor);
    if len == 0 {
        return Err(ParseError::EmptySegment);
    }
    let args = tokens[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(Command { args })
}

// ── Pipeline Assembler ──────────────────────────────────────────────

/// トークン列全体を `;` 区切りのパイプライン列にパースする。
///
/// 実行に先立って全体をパースする: セパレータの誤用はどのステージも
/// 走る前に検出され、部分的な実行結果を残さない。セパレータ自身は
/// 消費されるだけで、引数として保持されることはない。
/// 空のトークン列は空のパイプライン列。
pub fn parse(tokens: &[String]) -> Result<Vec<Pipeline>, ParseError> {
    let mut pipelines = Vec::new();
    if tokens.is_empty() {
        return Ok(pipelines);
    }

    let mut cursor = 0;
    let mut current = Pipeline { commands: Vec::new() };
    loop {
        current.commands.push(parse_command(tokens, &mut cursor)?);
        if cursor == tokens.len() {
            pipelines.push(current);
            break;
        }

        // parse_command はセパレータの手前で止まるので、ここでは
        // tokens[cursor] は必ず `;` か `|`
        let terminates = tokens[cursor] == ";";
        cursor += 1;
        if terminates {
            let done = std::mem::replace(&mut current, Pipeline { commands: Vec::new() });
            pipelines.push(done);
        }
        if cursor == tokens.len() {
            return Err(ParseError::TrailingSeparator);
        }
    }
    Ok(pipelines)
}

// ── Tests ───────────────────────────────────────────────────────────
