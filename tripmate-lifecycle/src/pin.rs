use rand::Rng;

/// Four-digit code the traveler shows the guide to start the trip.
pub fn generate_trip_pin() -> String {
    let code: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{:04}", code)
}
