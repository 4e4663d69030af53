use crate::infra::{build_engine, ApiEngine};
use clap::Args;
use loan_journey::config::AppConfig;
use loan_journey::error::AppError;
use loan_journey::journey::{DocumentStatus, JourneySnapshot, SuspendPayload};
use serde_json::{json, Value};
use std::io::{self, Write};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Answer each prompt from stdin instead of the built-in script.
    #[arg(long)]
    pub(crate) interactive: bool,
    /// Applicant identifier recorded on the journey.
    #[arg(long, default_value = "demo-applicant")]
    pub(crate) user_id: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        interactive,
        user_id,
    } = args;

    let config = AppConfig::load()?;
    let engine = build_engine(&config.journey)?;
    let mut out = io::stdout();

    writeln!(out, "Loan application journey demo")?;
    let snapshot = if interactive {
        let mut lines = io::stdin().lines();
        run_journey(&engine, &user_id, &mut out, |_| match lines.next() {
            Some(line) => Ok(parse_reply(&line?)),
            None => Err(AppError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before the journey finished",
            ))),
        })
        .await?
    } else {
        run_journey(&engine, &user_id, &mut out, |payload| Ok(scripted_answer(payload))).await?
    };

    render_outcome(&mut out, &snapshot)?;
    Ok(())
}

/// Drive one journey to completion, echoing every prompt and reply to `out`.
pub(crate) async fn run_journey<W, F>(
    engine: &ApiEngine,
    user_id: &str,
    out: &mut W,
    mut respond: F,
) -> Result<JourneySnapshot, AppError>
where
    W: Write,
    F: FnMut(&SuspendPayload) -> Result<Value, AppError>,
{
    let started = engine.start(user_id).await?;
    let thread_id = started.thread_id;
    writeln!(out, "Journey {thread_id} started for {user_id}")?;

    let mut payload = started.payload;
    while let Some(current) = payload {
        writeln!(out, "\n[{}] {}", current.kind(), current.message())?;
        let reply = respond(&current)?;
        writeln!(out, "> {}", display_reply(&reply))?;

        let resumed = engine.resume(&thread_id, reply).await?;
        if resumed.finished {
            break;
        }
        payload = resumed.payload;
    }

    Ok(engine.get_state(&thread_id)?)
}

/// JSON objects are passed through; anything else is sent as text.
pub(crate) fn parse_reply(line: &str) -> Value {
    let trimmed = line.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!(trimmed),
    }
}

fn display_reply(reply: &Value) -> String {
    match reply {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn scripted_answer(payload: &SuspendPayload) -> Value {
    let step = match payload {
        SuspendPayload::DocumentVerification { .. } => return json!("confirm"),
        SuspendPayload::JourneyStep { step, .. }
        | SuspendPayload::DocumentUpload { step, .. }
        | SuspendPayload::Review { step, .. }
        | SuspendPayload::Summary { step, .. } => *step,
    };

    match step {
        1 => json!("Asha Rao"),
        2 => json!("07/09/1991"),
        3 => json!("98450 11223, asha.rao@example.com"),
        4 => json!("95,000 per month, salaried"),
        5 => json!({
            "payslip": "/uploads/demo/payslip.pdf",
            "pan": "/uploads/demo/pan.pdf",
            "bank_statement": "/uploads/demo/bank_statement.pdf",
        }),
        6 => json!("Wipro, Data Engineer, 4 years"),
        7 => json!("221, Residency Road, Bengaluru, Karnataka 560025"),
        8 => json!("8 lakhs"),
        9 => json!("48 months"),
        10 => json!("Education"),
        11 => json!("Kiran Shetty, 9845098450, manager"),
        12 => json!("Axis Bank, account 917010012345678, IFSC UTIB0000009"),
        13 => json!("Yes, I agree"),
        14 => json!("Everything looks right"),
        _ => json!("Thank you"),
    }
}

fn render_outcome<W: Write>(out: &mut W, snapshot: &JourneySnapshot) -> Result<(), AppError> {
    let state = &snapshot.state;
    writeln!(out, "\nJourney {} finished: {}", snapshot.thread_id, state.finished)?;
    writeln!(
        out,
        "- steps completed: {} | node executions: {}",
        state.current_step.saturating_sub(1),
        state.guard_counter
    )?;
    writeln!(out, "Documents:")?;
    for (document, status) in &state.documents_status {
        let marker = if *status == DocumentStatus::Verified {
            "ok"
        } else {
            "--"
        };
        writeln!(out, "  [{marker}] {} ({})", document.label(), status.label())?;
    }
    Ok(())
}
