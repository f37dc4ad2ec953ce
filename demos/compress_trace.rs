//! Builds a grammar from a synthetic controller trace and prints what the
//! compression found.

use tracegram::{Content, TraceEvent, TraceGrammar};

fn main() {
    let mut grammar = TraceGrammar::with_history();

    // Eight checkout requests, each hammering the cart before ordering.
    for _ in 0..8 {
        push(&mut grammar, "shop.CheckoutController", "login");
        for _ in 0..5 {
            push(&mut grammar, "shop.CartController", "addItem");
        }
        push(&mut grammar, "shop.OrderController", "placeOrder");
        push(&mut grammar, "shop.OrderController", "confirm");
    }

    let stats = grammar.stats();
    println!("events appended:    {}", stats.input_length);
    println!("grammar positions:  {}", stats.positions);
    println!("rules induced:      {}", stats.rules);
    println!("compression ratio:  {:.1}%", stats.compression_ratio());
    println!();

    let snapshot = grammar.snapshot();
    for (rule_id, body) in &snapshot.rules {
        let rendered: Vec<String> = body
            .iter()
            .map(|element| {
                let content = match &element.content {
                    Content::Event(event) => event.to_string(),
                    Content::Rule(id) => format!("<rule {id}>"),
                };
                if element.occurrences > 1 {
                    format!("{content} x{}", element.occurrences)
                } else {
                    content
                }
            })
            .collect();
        println!("rule {rule_id}: {}", rendered.join("  "));
    }

    let replayed: Vec<_> = grammar.iter().collect();
    assert_eq!(replayed.len(), grammar.len());
    println!();
    println!("round-trip ok: {} events replayed", replayed.len());
}

fn push(grammar: &mut TraceGrammar, owner: &str, member: &str) {
    grammar
        .append(TraceEvent::new(owner, member, vec![]))
        .expect("demo events are well-formed");
}
