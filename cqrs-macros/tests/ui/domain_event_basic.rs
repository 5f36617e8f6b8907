use cqrs_domain::domain_event::DomainEvent;
use cqrs_macros::domain_event;

#[domain_event(version = 2)]
enum AccountEvent {
    Opened { owner: String },
    Deposited(i64),
    #[event(event_type = "account.closed", event_version = 5)]
    Closed,
}

fn main() {
    let opened = AccountEvent::Opened { owner: "alice".into() };
    assert_eq!(opened.event_type(), "AccountEvent.Opened");
    assert_eq!(opened.event_version(), 2);

    let deposited = AccountEvent::Deposited(10);
    assert_eq!(deposited.event_type(), "AccountEvent.Deposited");
    assert_eq!(deposited.clone(), deposited);

    assert_eq!(AccountEvent::Closed.event_type(), "account.closed");
    assert_eq!(AccountEvent::Closed.event_version(), 5);
}
