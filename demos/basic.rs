//! Basic usage examples for rivulet
//!
//! Run with: cargo run --example basic

use std::time::Duration;

use async_trait::async_trait;
use rivulet::prelude::*;
use rivulet::stream;

/// Write `items` into a fresh stream from a background task
fn source<T: Send + 'static>(items: Vec<T>, capacity: usize) -> Readable<T> {
    let (mut writable, readable) = stream::open(capacity);
    tokio::spawn(async move {
        for item in items {
            writable.write(item).await;
        }
        let _ = writable.close();
    });
    readable
}

/// Splits sentences into words
struct Words;

#[async_trait]
impl Transformer for Words {
    type Input = String;
    type Output = String;

    async fn apply(&mut self, line: String, emitter: &Emitter<String>) -> Flow {
        for word in line.split_whitespace() {
            emitter.emit(word.to_lowercase()).await?;
        }
        Ok(())
    }
}

/// Example 1: Transform and filter
async fn transform_filter_example() -> Result<()> {
    println!("=== Transform and Filter ===");

    let ctx = Context::new();
    let multiples = transformers::filter(|x: &i64| x % 3 == 0)
        .attach(&ctx)
        .transform(source((1..21).collect(), 3))?;
    let squares = transformers::map(|x: i64| x * x)
        .attach(&ctx)
        .transform(multiples)?;

    for square in squares.read_all().await {
        println!("Square: {square}");
    }

    println!();
    ctx.shutdown().await
}

/// Example 2: A custom transformer feeding a batcher
async fn custom_transformer_example() -> Result<()> {
    println!("=== Custom Transformer ===");

    let ctx = Context::new();
    let lines = source(
        vec![
            "The quick brown fox".to_string(),
            "jumps over the lazy dog".to_string(),
        ],
        2,
    );

    let words = Transform::new(Words).attach(&ctx).transform(lines)?;
    let batches = transformers::batch(3).attach(&ctx).transform(words)?;

    for batch in batches.read_all().await {
        println!("Batch: {batch:?}");
    }

    println!();
    ctx.shutdown().await
}

/// Example 3: Fan-out, then merge back
async fn dispatch_and_merge_example() -> Result<()> {
    println!("=== Dispatch and Merge ===");

    let ctx = Context::with_config(Config::default().with_buffer_size(8));
    let (large, large_reader) = stream::open(8);

    let small = dispatchers::dispatch_if(|x: &u32| *x >= 10)
        .attach(&ctx)
        .dispatch(source(vec![3, 14, 1, 59, 2, 65], 2), vec![large])?;

    let halved = transformers::map(|x: u32| x / 2)
        .attach(&ctx)
        .transform(large_reader)?;

    let merged = combiners::fifo()
        .attach(&ctx)
        .combine(vec![small, halved])?;

    println!("Merged: {:?}", merged.read_all().await);
    println!();
    ctx.shutdown().await
}

/// Example 4: A deadline closes a stalled pipeline
async fn timeout_example() -> Result<()> {
    println!("=== Timeout ===");

    let ctx = Context::with_config(Config::default().with_timeout(Duration::from_millis(100)));
    let (_idle, readable) = stream::open::<i32>(1);

    let output = transformers::map(|x: i32| x + 1)
        .attach(&ctx)
        .transform(readable)?;

    println!("Items before deadline: {:?}", output.read_all().await);
    ctx.closed().await;
    println!("Root closed after deadline: {}", ctx.is_closed());

    println!();
    Ok(())
}

/// Example 5: A failing stage stops everything
async fn failure_example() -> Result<()> {
    println!("=== Failure ===");

    let ctx = Context::new();
    let parsed = transformers::try_map(|s: &'static str| {
        s.parse::<i32>()
            .map_err(|e| Error::custom(format!("cannot parse {s:?}: {e}")))
    })
    .attach(&ctx)
    .transform(source(vec!["1", "2", "three", "4"], 1))?;

    println!("Parsed: {:?}", parsed.read_all().await);
    match ctx.shutdown().await {
        Ok(()) => println!("Pipeline finished cleanly"),
        Err(e) => println!("Pipeline failed: {e}"),
    }

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    transform_filter_example().await?;
    custom_transformer_example().await?;
    dispatch_and_merge_example().await?;
    timeout_example().await?;
    failure_example().await?;

    println!("All examples completed successfully!");
    Ok(())
}
