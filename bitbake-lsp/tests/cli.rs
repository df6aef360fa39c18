use std::io::{BufRead, BufReader, Read, Write};
use std::process::{ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

fn write_message(stdin: &mut impl Write, message: &Value) {
    let body = message.to_string();
    write!(stdin, "Content-Length: {}\r\n\r\n{body}", body.len()).unwrap();
    stdin.flush().unwrap();
}

fn read_message(reader: &mut BufReader<ChildStdout>) -> Option<Value> {
    let mut length = None;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix("Content-Length:") {
            length = value.trim().parse::<usize>().ok();
        }
    }
    let mut body = vec![0; length?];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

#[test]
fn bitbake_lsp_binary_answers_initialize() {
    let exe = env!("CARGO_BIN_EXE_bitbake-lsp");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start bitbake-lsp binary");

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    write_message(
        &mut stdin,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "processId": null, "capabilities": {} },
        }),
    );

    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        while let Some(message) = read_message(&mut stdout) {
            if message["id"] == 1 {
                let _ = sender.send(message);
                return;
            }
        }
    });
    let response = receiver.recv_timeout(Duration::from_secs(10));
    child.kill().expect("failed to stop bitbake-lsp binary");
    let _ = child.wait();

    let response = response.expect("no initialize response from bitbake-lsp");
    let result = &response["result"];
    assert_eq!(result["serverInfo"]["name"], "bitbake-lsp");
    assert_eq!(result["capabilities"]["positionEncoding"], "utf-16");
    assert_eq!(result["capabilities"]["textDocumentSync"], 1);
    assert_eq!(result["capabilities"]["definitionProvider"], true);
}
