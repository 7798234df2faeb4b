use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    wire::{clean_line, write_line},
};

const QUIT_COMMAND: &str = "/quit";

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut inbound, mut writer) = establish_connection(&args).await?;
    write_line(&mut writer, args.name.trim())
        .await
        .context("failed to send display name")?;

    let mut stdin = BufReader::new(io::stdin()).lines();
    run_client_loop(&mut inbound, &mut writer, &mut stdin).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader).lines(), writer))
}

async fn run_client_loop(
    inbound: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<io::Stdin>>,
) -> Result<()> {
    loop {
        select! {
            server_line = inbound.next_line() => {
                if !handle_server_line(server_line?).await? {
                    break;
                }
            }
            input = stdin.next_line() => {
                if !handle_stdin_input(input?, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(line: Option<String>) -> Result<bool> {
    match line {
        Some(line) => {
            write_stdout(&line).await?;
            Ok(true)
        }
        None => {
            write_stderr("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(input: Option<String>, writer: &mut OwnedWriteHalf) -> Result<bool> {
    let Some(input) = input else {
        return Ok(false);
    };
    let Some(text) = clean_line(&input) else {
        return Ok(true);
    };
    if text.eq_ignore_ascii_case(QUIT_COMMAND) {
        return Ok(false);
    }

    write_line(writer, text).await?;
    Ok(true)
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    write_line(&mut io::stdout(), line).await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    write_line(&mut io::stderr(), line).await
}
