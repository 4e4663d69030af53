use loan_journey_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("loan journey error: {err}");
        std::process::exit(1);
    }
}
