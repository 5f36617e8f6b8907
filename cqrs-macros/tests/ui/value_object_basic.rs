use cqrs_macros::value_object;

#[value_object]
struct Amount {
    value: i64,
}

#[value_object(copy, ordered)]
struct Sequence(u64);

#[value_object(debug = false)]
enum Level {
    #[default]
    Low,
    High,
}

fn main() {
    let _ = format!("{:?}", Amount { value: 0 });
    assert_eq!(Amount::default(), Amount { value: 0 });

    let a = Sequence(1);
    let b = a;
    assert!(Sequence(2) > b);

    let level: Level = Default::default();
    assert!(level == Level::Low);
    let _ = Level::High;
}
