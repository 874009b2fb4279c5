use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::json;
use shared::{decode, encode, ClientEvent, ServerEvent};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted player: joins a session, optionally starts it, and answers every question
/// with a random option.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Session to join
    #[clap(short, long)]
    session: String,
    /// User ID to join as
    #[clap(short = 'U', long)]
    user: String,
    /// Send `start` once joined
    #[clap(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (socket, _) = connect_async(args.url.as_str()).await?;
    println!("Connected to {}", args.url);
    let (mut outgoing, mut incoming) = socket.split();

    let join = ClientEvent::Join {
        session_id: args.session.clone(),
        user_id: args.user.clone(),
    };
    outgoing.send(Message::Text(encode(&join)?)).await?;

    if args.start {
        let start = ClientEvent::Start {
            session_id: args.session.clone(),
        };
        outgoing.send(Message::Text(encode(&start)?)).await?;
    }

    while let Some(frame) = incoming.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event: ServerEvent = match decode(&text) {
            Ok(event) => event,
            Err(e) => {
                println!("Undecodable frame ({}): {}", e, text);
                continue;
            }
        };

        match event {
            ServerEvent::Question {
                question,
                question_number,
                total_questions,
                time_limit_secs,
                ..
            } => {
                println!(
                    "Question {}/{} ({}s): {}",
                    question_number, total_questions, time_limit_secs, question.stem
                );

                // Think for a moment, then pick something
                let (think_ms, choice) = {
                    let mut rng = rand::thread_rng();
                    let think_ms = rng.gen_range(200..2_000);
                    let choice = if question.options.is_empty() {
                        None
                    } else {
                        Some(question.options[rng.gen_range(0..question.options.len())].clone())
                    };
                    (think_ms, choice)
                };
                sleep(Duration::from_millis(think_ms)).await;

                let answer = ClientEvent::Answer {
                    session_id: args.session.clone(),
                    question_id: question.id,
                    answer: choice.map_or(serde_json::Value::Null, |c| json!(c)),
                    time_taken_ms: think_ms,
                    additional_data: None,
                };
                outgoing.send(Message::Text(encode(&answer)?)).await?;
            }
            ServerEvent::AnswerRecorded {
                is_correct,
                points,
                total_score,
                ..
            } => {
                println!(
                    "  {} (+{} points, total {})",
                    if is_correct { "correct" } else { "wrong" },
                    points,
                    total_score
                );
            }
            ServerEvent::Leaderboard { participants, .. } => {
                for entry in participants {
                    println!("  #{} {} {}", entry.rank, entry.user_id, entry.score);
                }
            }
            ServerEvent::Ended { final_results, .. } => {
                match final_results.winner {
                    Some(winner) => println!(
                        "Game over, winner: {} with {} points",
                        winner.user_id, winner.final_score
                    ),
                    None => println!("Game over"),
                }
                break;
            }
            other => println!("Received {}", other.name()),
        }
    }

    let _ = outgoing.close().await;
    Ok(())
}
