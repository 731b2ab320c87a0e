use super::EmailMessage;

pub fn verification(to: &str, username: &str, code: &str, ttl_minutes: u64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Your verification code".to_string(),
        body: format!(
            "Hello {username},\n\n\
             Your verification code is: {code}\n\n\
             The code expires in {ttl_minutes} minutes. If you did not create an \
             account, you can ignore this email.\n"
        ),
    }
}

pub fn receipt(
    to: &str,
    username: &str,
    order_id: &str,
    amount: f64,
    item_name: &str,
) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Payment receipt for order #{order_id}"),
        body: format!(
            "Hello {username},\n\n\
             Thank you for your order. Your payment has been received.\n\n\
             Order:  #{order_id}\n\
             Item:   {item_name}\n\
             Amount: {amount:.2}\n\
             Status: PAID\n"
        ),
    }
}
