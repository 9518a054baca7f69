//! psh — 引数ベクタをコマンド列として解釈するミニシェル。
//!
//! 入力はプロセスの引数ベクタのみで、行の読み取りや文字列の再パースは
//! しない。`;` がパイプライン区切り、`|` がステージ区切り、それ以外の
//! トークンはすべてリテラル引数。最後に実行したパイプラインのステータスで
//! 終了する（引数なしなら 0）。
//!
//! 例: `psh /bin/ls -l '|' /usr/bin/wc -l ';' /bin/echo done`
//!
//! 致命的エラー（パースエラー、pipe/fork 失敗）はここで一括して
//! `error: fatal` の診断と終了ステータス 1 に変換する。

use std::env;
use std::process;

fn main() {
    let tokens: Vec<String> = env::args().skip(1).collect();
    let status = match psh::run(&tokens) {
        Ok(status) => status,
        Err(_) => {
            eprintln!("error: fatal");
            1
        }
    };
    process::exit(status);
}
