use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fm_core::dom::memory::{MemoryDocument, MemoryItem};
use fm_core::{decide, CompiledFilter, Scanner, Settings, SettingsPatch};

const TITLES: &[&str] = &[
    "Kitchen DRAMA tonight",
    "Funny cats compilation 2024",
    "Rust ownership explained in 10 minutes",
    "Lofi beats to study and relax to",
    "Top 10 memes of the week",
    "Building a compiler from scratch, part 7",
];

fn keywords(n: usize, prefix: &str) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

fn bench_decide(c: &mut Criterion) {
    let mut blacklist = keywords(50, "blocked");
    blacklist.push("drama".to_string());
    let mut focus = keywords(50, "focus");
    focus.push("memes".to_string());

    c.bench_function("decide/uncompiled", |b| {
        b.iter(|| {
            for title in TITLES {
                black_box(decide(black_box(title), &blacklist, &focus, true));
            }
        })
    });

    let compiled = CompiledFilter::new(&blacklist, &focus, true);
    c.bench_function("decide/compiled", |b| {
        b.iter(|| {
            for title in TITLES {
                black_box(compiled.decide(black_box(title)));
            }
        })
    });
}

fn bench_scan(c: &mut Criterion) {
    let settings = Settings::default().apply(&SettingsPatch {
        mode: Some(true),
        ..Default::default()
    });

    c.bench_function("scan/first_pass_1000", |b| {
        b.iter_with_setup(
            || {
                let doc = MemoryDocument::new();
                for i in 0..1000 {
                    let title = TITLES[i % TITLES.len()];
                    doc.push(MemoryItem::new("ytd-rich-item-renderer").with_text("#video-title", title));
                }
                doc
            },
            |doc| black_box(Scanner::new().scan(&doc, &settings)),
        )
    });

    let doc = MemoryDocument::new();
    for i in 0..1000 {
        let title = TITLES[i % TITLES.len()];
        doc.push(MemoryItem::new("ytd-rich-item-renderer").with_text("#video-title", title));
    }
    let scanner = Scanner::new();
    scanner.scan(&doc, &settings);

    c.bench_function("scan/repeat_pass_1000", |b| {
        b.iter(|| black_box(scanner.scan(&doc, &settings)))
    });
}

criterion_group!(benches, bench_decide, bench_scan);
criterion_main!(benches);
