//! psh ライブラリ — テスト・ベンチマーク用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs`。プロセスの引数ベクタをトークン列として解釈し、
//! `;` 区切りのパイプライン列を順に実行する。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | トークン分割（セグメント長計測、コマンド構築、パイプライン組み立て） |
//! | [`builtins`] | ビルトイン（`cd`）。3 値ディスパッチ: 非該当 / 成功 / 失敗 |
//! | [`executor`] | パイプライン実行（pipe 作成、fork、fd 配線、waitpid、ステータス集約） |

pub mod builtins;
pub mod executor;
pub mod parser;

use std::io;

use crate::parser::ParseError;

/// 即時中断を要するエラー。
///
/// パースエラーとリソースエラー（pipe/fork 失敗）だけがここに昇格する。
/// ビルトインの失敗や外部コマンドの起動失敗はステージのステータスに
/// 閉じ込められ、このエラーにはならない。
#[derive(thiserror::Error, Debug)]
pub enum FatalError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("pipe creation failed: {0}")]
    Pipe(#[source] io::Error),
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),
}

/// トークン列をパースして全パイプラインを順に実行し、最後のステータスを返す。
///
/// 実行前にトークン列全体をパースする: セパレータの誤用はどのステージも
/// 走る前に `Err` となる。トークンが空なら何も実行せず 0 を返す。
pub fn run(tokens: &[String]) -> Result<i32, FatalError> {
    let pipelines = parser::parse(tokens)?;
    executor::execute(&pipelines)
}

// ── Tests ───────────────────────────────────────────────────────────
