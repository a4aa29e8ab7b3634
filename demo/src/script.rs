use ordercast::{Error, Node};
use tracing::info;

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Neighbours (relative to this member's index, wrapping around the group)
/// that receive a point-to-point message.
const RING: [isize; 4] = [2, 1, -1, -2];

/// Multicast a letter, message the ring neighbours, then multicast another
/// letter.
pub async fn generate(node: &Node) -> Result<(), Error> {
    let index = node.index();
    let group = node.group();
    let len = group.len() as isize;

    node.multicast(letter(index)).await?;

    for offset in RING {
        let to = (index as isize + offset).rem_euclid(len) as usize;
        node.send(index.to_string(), &group[to]).await?;
    }

    node.multicast(letter(25 - index % 26)).await?;

    Ok(())
}

/// Log the growing inbox until the node shuts down.
pub async fn consume(node: &Node) {
    let mut inbox = Vec::new();

    while let Ok(text) = node.receive().await {
        inbox.push(text);
        info!(node = node.index(), inbox = %inbox.join(" "), "delivered");
    }
}

fn letter(index: usize) -> String {
    char::from(ALPHABET[index % ALPHABET.len()]).to_string()
}

#[cfg(test)]
mod test {
    use super::letter;

    #[test]
    fn test_letter() {
        assert_eq!(letter(0), "a");
        assert_eq!(letter(25), "z");
        assert_eq!(letter(27), "b");
    }
}
