//! Demo command: the user-service walkthrough.

use super::Session;
use shelfdb_core::{Direction, Query, Record};

/// Runs the demo against the `user` collection.
pub fn run(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let users = session.repository("user")?;

    println!("== create users");
    for (name, age) in [("Marcus", 30), ("Lucius", 20), ("Julia", 17), ("Livia", 45)] {
        let user = users.insert(Record::new().with("name", name).with("age", age))?;
        println!("  created {user}");
    }

    println!("== all users");
    for user in users.select(&Query::new())? {
        println!("  {user}");
    }

    println!("== birthday for user 1");
    let user = users.update_by_key(1, |mut user| {
        let age = user.get_i64("age").unwrap_or(0);
        user.set("age", age + 1);
        Ok(user)
    })?;
    println!("  now {user}");

    println!("== adults, oldest first");
    let adults = Query::new()
        .filter(|user| user.get_i64("age").is_some_and(|age| age >= 18))
        .order_by("age", Direction::Desc);
    for user in users.select(&adults)? {
        println!("  {user}");
    }

    println!("== find by name");
    for user in users.select(&Query::new().equals("name", "Marcus"))? {
        println!("  {user}");
    }

    println!("== delete user 2");
    users.delete(2)?;
    println!("  {} users left", users.count()?);

    println!("== insert duplicate id 1");
    match users.insert(Record::new().with("id", 1).with("name", "Impostor")) {
        Ok(user) => println!("  unexpectedly stored {user}"),
        Err(e) => println!("  rejected: {e}"),
    }

    println!("== missing user 99");
    if let Err(e) = users.update_by_key(99, Ok) {
        println!("  rejected: {e}");
    }

    Ok(())
}
