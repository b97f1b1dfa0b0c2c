mod helpers;

use born2eat::data::inquiries::{self, Inquiry, NewInquiry, TransitionOutcome};
use born2eat::data::models::InquiryStatus;
use helpers::{make_admin, make_user};
use sqlx::PgPool;

fn done(outcome: TransitionOutcome) -> Inquiry {
    match outcome {
        TransitionOutcome::Done(inquiry) => inquiry,
        other => panic!("expected a completed transition, got {other:?}"),
    }
}

async fn ask(pool: &PgPool, user_id: i32, title: &str) -> Inquiry {
    let input = NewInquiry {
        category: Some("restaurant".into()),
        title: title.into(),
        content: "영업시간이 바뀌었어요".into(),
    }
    .normalize()
    .unwrap();
    inquiries::create_inquiry(pool, user_id, &input).await.unwrap()
}

#[sqlx::test]
async fn test_answer_then_close(pool: PgPool) {
    let user = make_user(&pool, "asker").await;
    let admin = make_admin(&pool, "helper").await;
    let inquiry = ask(&pool, user.id, "정보 수정 요청").await;
    assert_eq!(inquiry.status(), InquiryStatus::Pending);
    assert_eq!(inquiry.user_nickname, "asker");

    let answered = done(inquiries::answer_inquiry(&pool, inquiry.id, admin.id, "반영했습니다").await.unwrap());
    assert_eq!(answered.status(), InquiryStatus::Answered);
    assert_eq!(answered.answer.as_deref(), Some("반영했습니다"));
    assert_eq!(answered.answered_by, Some(admin.id));
    assert!(answered.answered_at.is_some());

    // A second answer replaces the first while the inquiry is open.
    let reanswered = done(inquiries::answer_inquiry(&pool, inquiry.id, admin.id, "다시 확인했습니다").await.unwrap());
    assert_eq!(reanswered.answer.as_deref(), Some("다시 확인했습니다"));

    let closed = done(inquiries::close_inquiry(&pool, inquiry.id).await.unwrap());
    assert_eq!(closed.status(), InquiryStatus::Closed);
    assert_eq!(closed.answer.as_deref(), Some("다시 확인했습니다"));
}

#[sqlx::test]
async fn test_closed_inquiries_reject_transitions(pool: PgPool) {
    let user = make_user(&pool, "asker").await;
    let admin = make_admin(&pool, "helper").await;
    let inquiry = ask(&pool, user.id, "닫힐 문의").await;
    done(inquiries::close_inquiry(&pool, inquiry.id).await.unwrap());

    assert!(matches!(
        inquiries::answer_inquiry(&pool, inquiry.id, admin.id, "늦은 답변").await.unwrap(),
        TransitionOutcome::AlreadyClosed
    ));
    assert!(matches!(
        inquiries::close_inquiry(&pool, inquiry.id).await.unwrap(),
        TransitionOutcome::AlreadyClosed
    ));
    assert!(matches!(
        inquiries::close_inquiry(&pool, inquiry.id + 1000).await.unwrap(),
        TransitionOutcome::NotFound
    ));

    let stored = inquiries::get_inquiry(&pool, inquiry.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), InquiryStatus::Closed);
    assert_eq!(stored.answer, None);
}

#[sqlx::test]
async fn test_list_filters_by_owner_and_status(pool: PgPool) {
    let alice = make_user(&pool, "alice").await;
    let bob = make_user(&pool, "bob").await;
    let admin = make_admin(&pool, "helper").await;
    let first = ask(&pool, alice.id, "첫 문의").await;
    ask(&pool, alice.id, "둘째 문의").await;
    ask(&pool, bob.id, "밥의 문의").await;
    done(inquiries::answer_inquiry(&pool, first.id, admin.id, "답변").await.unwrap());

    let mine = inquiries::list_inquiries(&pool, Some(alice.id), None, None, None).await.unwrap();
    assert_eq!(mine.total, 2);
    assert!(mine.inquiries.iter().all(|i| i.user_id == alice.id));

    let pending = inquiries::list_inquiries(&pool, None, Some(InquiryStatus::Pending), None, None)
        .await
        .unwrap();
    assert_eq!(pending.total, 2);

    let answered = inquiries::list_inquiries(&pool, None, Some(InquiryStatus::Answered), None, None)
        .await
        .unwrap();
    assert_eq!(answered.inquiries.len(), 1);
    assert_eq!(answered.inquiries[0].id, first.id);
}
