//! End-to-end scenarios for the `each` visitor combinator.

use std::cell::RefCell;
use std::rc::Rc;

use lagoon::{each, Promise, Reason, Resolution, TaskKey, TaskList, TaskSource};
use lagoon::{schedule, time};

type Visits = Rc<RefCell<Vec<(String, i32)>>>;

#[test]
fn visits_run_in_completion_order() {
    schedule::reset();
    let visits: Visits = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&visits);
    let tasks: Vec<(String, Promise<i32>)> = vec![
        ("t1".into(), time::delay(1, 1)),
        ("t2".into(), time::delay(4, 4)),
        ("t3".into(), time::delay(2, 2)),
    ];
    let done = each(tasks, move |value, key: &TaskKey<String>| {
        log.borrow_mut().push((key.to_string(), value));
        Resolution::value(())
    });
    done.wait().unwrap();
    assert_eq!(
        *visits.borrow(),
        vec![
            ("t1".to_string(), 1),
            ("t3".to_string(), 2),
            ("t2".to_string(), 4)
        ]
    );
}

#[test]
fn plain_values_are_visited_in_input_order() {
    schedule::reset();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let list: TaskList<i32> = TaskList::from_values(vec![1, 2, 3]);
    let done = each(list, move |value, _key| {
        log.borrow_mut().push(value);
        Resolution::value(())
    });
    done.wait().unwrap();
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

#[test]
fn iterator_result_type_is_discarded() {
    schedule::reset();
    let list: TaskList<i32> = TaskList::from_values(vec![1, 2, 3]);
    let done: Promise<()> = each(list, |value, _key| Resolution::value(value * 2));
    assert!(done.wait().is_ok());
}

#[test]
fn first_iterator_failure_rejects_the_whole_visit() {
    schedule::reset();
    let list: TaskList<i32> = TaskList::from_values(vec![1, 2, 3]);
    let done = each(list, |value, _key| {
        if value == 2 {
            Resolution::error(Reason::msg("visit failed"))
        } else {
            Resolution::value(())
        }
    });
    let err = done.wait().unwrap_err();
    assert_eq!(err.to_string(), "visit failed");
}

#[test]
fn task_failure_rejects_before_its_value_is_visited() {
    schedule::reset();
    let visits = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&visits);
    let tasks: Vec<TaskSource<i32>> = vec![
        TaskSource::from(time::delay(1, 1)),
        TaskSource::from(time::delay_with(2, || {
            Resolution::<i32>::error(Reason::msg("task failed"))
        })),
    ];
    let done = each(tasks, move |value, _key: &TaskKey<String>| {
        log.borrow_mut().push(value);
        Resolution::value(())
    });
    let err = done.wait().unwrap_err();
    assert_eq!(err.to_string(), "task failed");
    assert_eq!(*visits.borrow(), vec![1]);
}

#[test]
fn nullish_input_resolves_without_visiting() {
    schedule::reset();
    let done = each(None::<TaskList<i32>>, |_value, _key| -> Resolution<()> {
        panic!("iterator must not run for nullish input")
    });
    assert!(done.wait().is_ok());
}

#[test]
fn instance_form_awaits_the_receiver_first() {
    schedule::reset();
    let visits = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&visits);
    let list: TaskList<i32> = TaskList::from_values(vec![10, 20]);
    let receiver = time::delay(2, list);
    let done = receiver.each(move |value, _key| {
        log.borrow_mut().push(value);
        Resolution::value(())
    });
    done.wait().unwrap();
    assert_eq!(*visits.borrow(), vec![10, 20]);
    assert_eq!(schedule::now(), 2);
}
